//! Event details and theme configuration.
//!
//! Both live in singleton tables (a single row with `id = 1`). Event
//! details are read once at login; the theme is also watched live so an
//! admin change restyles every open session.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

fn singleton_id() -> i64 {
    1
}

/// The `event_config` singleton: what the invitation page says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(default = "singleton_id")]
    pub id: i64,
    pub event_name: String,
    pub venue: String,
    /// ISO date, e.g. `2026-11-21`.
    pub event_date: String,
    pub welcome_message: String,
}

/// The closed set of visual themes the admin can pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThemePalette {
    Classic,
    Neon,
    Rosa,
    Noite,
}

/// Static colour record backing one palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteSpec {
    pub name: &'static str,
    pub background: &'static str,
    pub surface: &'static str,
    pub accent: &'static str,
    pub text: &'static str,
}

static CLASSIC: PaletteSpec = PaletteSpec {
    name: "Clássico",
    background: "#1a1a2e",
    surface: "#16213e",
    accent: "#e94560",
    text: "#f5f5f5",
};

static NEON: PaletteSpec = PaletteSpec {
    name: "Neon",
    background: "#0f0f1a",
    surface: "#1b1b2f",
    accent: "#2bff88",
    text: "#eafffb",
};

static ROSA: PaletteSpec = PaletteSpec {
    name: "Rosa",
    background: "#fff0f5",
    surface: "#ffd6e7",
    accent: "#d6336c",
    text: "#3d0c1f",
};

static NOITE: PaletteSpec = PaletteSpec {
    name: "Noite",
    background: "#05060f",
    surface: "#10131f",
    accent: "#ffd166",
    text: "#e8e9f3",
};

impl ThemePalette {
    pub const ALL: [ThemePalette; 4] = [
        ThemePalette::Classic,
        ThemePalette::Neon,
        ThemePalette::Rosa,
        ThemePalette::Noite,
    ];

    /// Colour record for this palette.
    pub fn spec(&self) -> &'static PaletteSpec {
        match self {
            ThemePalette::Classic => &CLASSIC,
            ThemePalette::Neon => &NEON,
            ThemePalette::Rosa => &ROSA,
            ThemePalette::Noite => &NOITE,
        }
    }

    /// Stored form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemePalette::Classic => "CLASSIC",
            ThemePalette::Neon => "NEON",
            ThemePalette::Rosa => "ROSA",
            ThemePalette::Noite => "NOITE",
        }
    }

    /// Case-insensitive parse of the stored form.
    pub fn parse(value: &str) -> Option<ThemePalette> {
        match value.trim().to_uppercase().as_str() {
            "CLASSIC" => Some(ThemePalette::Classic),
            "NEON" => Some(ThemePalette::Neon),
            "ROSA" => Some(ThemePalette::Rosa),
            "NOITE" => Some(ThemePalette::Noite),
            _ => None,
        }
    }
}

impl Default for ThemePalette {
    fn default() -> Self {
        ThemePalette::Classic
    }
}

impl fmt::Display for ThemePalette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `theme_config` singleton. `updated_at` lets pollers tell a fresh
/// admin change from the row they already saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default = "singleton_id")]
    pub id: i64,
    pub palette: ThemePalette,
    /// Unix millis of the last admin change.
    #[serde(default)]
    pub updated_at: i64,
}

impl ThemeConfig {
    pub fn new(palette: ThemePalette) -> Self {
        Self {
            id: 1,
            palette,
            updated_at: Utc::now().timestamp_millis(),
        }
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            id: 1,
            palette: ThemePalette::Classic,
            updated_at: 0,
        }
    }
}
