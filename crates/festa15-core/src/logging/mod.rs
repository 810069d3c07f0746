//! Diagnostics sink: JSONL files next to the usual console logging.
//!
//! Every tracing event is mirrored into a per-day file so problems
//! reported from the venue can be reconstructed after the fact:
//!
//! ```text
//! diagnostics/
//! ├── 2026-11-20.jsonl
//! └── 2026-11-21.jsonl
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! festa15_core::logging::install("./diagnostics")?;
//!
//! // or compose manually:
//! use festa15_core::logging::DiagnosticsLayer;
//! use tracing_subscriber::prelude::*;
//!
//! let subscriber = tracing_subscriber::registry()
//!     .with(DiagnosticsLayer::new("./diagnostics")?)
//!     .with(tracing_subscriber::fmt::layer());
//! ```
//!
//! The files are plain JSONL, so `jq` works directly:
//!
//! ```bash
//! jq 'select(.level == "error")' diagnostics/*.jsonl
//! ```

pub mod entry;
pub mod layer;
pub mod writer;

pub use entry::DiagnosticEntry;
pub use layer::DiagnosticsLayer;
pub use writer::{read_entries_for_date, recent_entries, DiagnosticsWriter};

use std::io;
use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,festa15_core=debug";

/// Install console plus JSONL diagnostics as the global subscriber.
///
/// Fails only when the diagnostics directory cannot be created. A
/// subscriber installed earlier, as tests and embedding apps do, is
/// left in place.
pub fn install(diagnostics_dir: impl AsRef<Path>) -> io::Result<()> {
    let layer = DiagnosticsLayer::new(diagnostics_dir)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(layer)
        .try_init();
    Ok(())
}
