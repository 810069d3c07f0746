//! Backend configuration and mock-mode detection.
//!
//! Credentials come from two environment variables. When they are missing,
//! blank, left at their placeholder values, or not an http(s) URL, the
//! engine silently runs against the in-memory mock backend instead of the
//! hosted service. That keeps local development and demos working with no
//! setup at all.

use std::env;
use std::fmt;

/// Environment variable holding the hosted backend URL.
pub const ENV_BACKEND_URL: &str = "FESTA_BACKEND_URL";

/// Environment variable holding the publishable API key.
pub const ENV_BACKEND_KEY: &str = "FESTA_BACKEND_KEY";

/// Placeholder values shipped in setup templates. Treated as absent.
const PLACEHOLDER_URL: &str = "YOUR_BACKEND_URL";
const PLACEHOLDER_KEY: &str = "YOUR_BACKEND_KEY";

/// Connection settings for the hosted backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub key: Option<String>,
}

impl BackendConfig {
    /// Read both variables from the environment.
    pub fn from_env() -> Self {
        Self {
            url: env::var(ENV_BACKEND_URL).ok(),
            key: env::var(ENV_BACKEND_KEY).ok(),
        }
    }

    /// Explicit configuration, mostly for tests.
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            key: Some(key.into()),
        }
    }

    /// Configuration with nothing set. Always detects as mock.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Which mode this configuration selects.
    pub fn mode(&self) -> Mode {
        Mode::detect(self)
    }

    /// URL and key, present only when the configuration is usable online.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match self.mode() {
            Mode::Online => Some((
                self.url.as_deref().unwrap_or_default().trim(),
                self.key.as_deref().unwrap_or_default().trim(),
            )),
            Mode::Mock => None,
        }
    }
}

/// Whether the engine talks to the hosted service or the in-memory mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Online,
    Mock,
}

impl Mode {
    /// Decide the mode for a configuration.
    ///
    /// Mock wins whenever either value is unusable; the engine never
    /// attempts a half-configured connection.
    pub fn detect(config: &BackendConfig) -> Mode {
        let url = config.url.as_deref().map(str::trim).unwrap_or("");
        let key = config.key.as_deref().map(str::trim).unwrap_or("");

        if url.is_empty() || key.is_empty() {
            return Mode::Mock;
        }
        if url == PLACEHOLDER_URL || key == PLACEHOLDER_KEY {
            return Mode::Mock;
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Mode::Mock;
        }
        Mode::Online
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Mode::Mock)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Online => write!(f, "online"),
            Mode::Mock => write!(f, "mock"),
        }
    }
}
