//! IVD runtime configuration
//!
//! Settings are read from `ivd.toml` and can be overridden with `IVD_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default file looked up by [`IvdConfig::load_or_default`].
pub const CONFIG_FILE: &str = "ivd.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct IvdConfig {
    /// Frame loop settings
    pub runtime: RuntimeConfig,
    /// Defaults for windows created by the headless driver
    pub window: WindowConfig,
    /// Monospace text measurement
    pub text: TextConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Sleep between frames when nothing is pending
    pub idle_sleep_ms: u64,
    /// Stop `run` after this many frames
    pub max_frames: Option<u64>,
    /// Global trigger key that ends the frame loop
    pub quit_trigger: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub default_width: i32,
    pub default_height: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    /// Glyph advance as a fraction of the font size
    pub advance_ratio: f32,
    /// Line height as a fraction of the font size
    pub line_height_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// env_logger filter used by the binaries, e.g. "ivd_core=debug"
    pub log_filter: Option<String>,
    /// Dump the compiled element list after loading
    pub print_elements: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { idle_sleep_ms: 5, max_frames: None, quit_trigger: "IVD-Core-Quit".to_string() }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "IVD Window".to_string(), default_width: 640, default_height: 480 }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self { advance_ratio: 0.6, line_height_ratio: 1.2 }
    }
}

fn flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

impl IvdConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// `ivd.toml` from the current directory, or defaults when it is missing
    /// or unreadable.
    pub fn load_or_default() -> Self {
        Self::load_from_file(CONFIG_FILE).unwrap_or_default()
    }

    /// Environment variables take precedence over file values. Values that
    /// fail to parse are ignored.
    pub fn merge_with_env(&mut self) {
        if let Some(ms) = std::env::var("IVD_IDLE_SLEEP_MS").ok().and_then(|v| v.parse().ok()) {
            self.runtime.idle_sleep_ms = ms;
        }
        if let Some(frames) = std::env::var("IVD_MAX_FRAMES").ok().and_then(|v| v.parse().ok()) {
            self.runtime.max_frames = Some(frames);
        }
        if let Ok(trigger) = std::env::var("IVD_QUIT_TRIGGER") {
            self.runtime.quit_trigger = trigger;
        }

        if let Ok(title) = std::env::var("IVD_WINDOW_TITLE") {
            self.window.title = title;
        }
        if let Some(w) = std::env::var("IVD_WINDOW_WIDTH").ok().and_then(|v| v.parse().ok()) {
            self.window.default_width = w;
        }
        if let Some(h) = std::env::var("IVD_WINDOW_HEIGHT").ok().and_then(|v| v.parse().ok()) {
            self.window.default_height = h;
        }

        if let Some(r) = std::env::var("IVD_TEXT_ADVANCE").ok().and_then(|v| v.parse().ok()) {
            self.text.advance_ratio = r;
        }
        if let Some(r) = std::env::var("IVD_TEXT_LINE_HEIGHT").ok().and_then(|v| v.parse().ok()) {
            self.text.line_height_ratio = r;
        }

        if let Ok(filter) = std::env::var("IVD_LOG") {
            self.diagnostics.log_filter = Some(filter);
        }
        if let Ok(val) = std::env::var("IVD_PRINT_ELEMENTS") {
            self.diagnostics.print_elements = flag(&val);
        }
    }

    /// File (or defaults) first, then environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}
