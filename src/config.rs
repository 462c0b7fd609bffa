//! Configuration file support.
//!
//! A [`LabelConfig`] carries the image size, polygon handle radius, key
//! bindings, an optional palette override and the log level. It round-trips
//! through JSON and can be stored under the platform config directory.

use serde::{Deserialize, Serialize};

use crate::geometry::ImageBounds;
use crate::keybindings::KeyBindings;
use crate::palette::{Color, Palette};
use crate::shape::DEFAULT_POINT_RADIUS;

/// Log level setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Scene configuration that can be exported and imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Size of the image being labelled
    #[serde(default)]
    pub image_bounds: ImageBounds,

    /// Vertex handle radius for polygons
    #[serde(default = "default_polygon_radius")]
    pub polygon_radius: f32,

    #[serde(default)]
    pub keybindings: KeyBindings,

    /// Hex colors replacing the built-in palette; empty keeps the default
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub palette: Vec<String>,

    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_polygon_radius() -> f32 {
    DEFAULT_POINT_RADIUS
}

impl LabelConfig {
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            image_bounds: ImageBounds::default(),
            polygon_radius: default_polygon_radius(),
            keybindings: KeyBindings::default(),
            palette: Vec::new(),
            log_level: LogLevel::default(),
        }
    }

    /// The palette override, or the default palette when none is set.
    /// Entries that are not valid hex colors are skipped with a warning.
    pub fn palette(&self) -> Palette {
        let colors: Vec<Color> = self
            .palette
            .iter()
            .filter_map(|hex| {
                let color = Color::from_hex(hex);
                if color.is_none() {
                    log::warn!("Ignoring invalid palette color '{}'", hex);
                }
                color
            })
            .collect();
        if colors.is_empty() {
            Palette::default()
        } else {
            Palette::new(colors)
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }
        if !(config.polygon_radius.is_finite() && config.polygon_radius > 0.0) {
            return Err(ConfigError::InvalidValue(format!(
                "polygonRadius must be positive, got {}",
                config.polygon_radius
            )));
        }

        Ok(config)
    }

    /// Get the default filename for config export.
    pub fn default_filename() -> &'static str {
        "labelworker.json"
    }

    /// Get the default config file path for auto-load/save.
    /// Returns None on WASM (no filesystem access).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<std::path::PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("labelworker").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home| {
                home.join(".config")
                    .join("labelworker")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load configuration from a file.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to the default path.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        std::fs::write(&path, json)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
