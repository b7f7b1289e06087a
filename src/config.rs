//! Runtime configuration using Figment
//!
//! Configuration is assembled from, in increasing precedence:
//! 1. built-in defaults ([`IspConfig::default`])
//! 2. an optional TOML file
//! 3. environment variables prefixed with `ISP_CTRL_`, nested keys separated
//!    by a double underscore
//!
//! ```text
//! ISP_CTRL_RUNTIME__QUEUE_CAPACITY=64
//! ISP_CTRL_LOGGING__LEVEL=debug
//! ```
//!
//! Statistics backpressure differs between hardware variants, so it is data
//! here rather than code: see [`FrameSkipConfig`].

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of pipeline slots; valid handle ids are `0..MAX_HANDLE_SLOTS`.
pub const MAX_HANDLE_SLOTS: usize = 4;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong type
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// Values loaded but out of range
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IspConfig {
    /// Queue and handle limits
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// AE/AWB event forwarding in the monitor worker
    #[serde(default)]
    pub frame_skip: FrameSkipConfig,
    /// Autofocus sequencing
    #[serde(default)]
    pub focus: FocusConfig,
    /// Tracing subscriber settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Queue and handle limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Capacity of each worker's message queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of handles that may be initialized at once
    #[serde(default = "default_max_handles")]
    pub max_handles: usize,
    /// Widest slice the pipeline processes in one pass
    #[serde(default = "default_max_slice_width")]
    pub max_slice_width: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_handles: default_max_handles(),
            max_slice_width: default_max_slice_width(),
        }
    }
}

/// How the monitor worker forwards one kind of statistics interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum SkipGate {
    /// Forward every event
    Forward,
    /// Never forward
    Drop,
    /// Forward one event, then drop the next `skip`, repeatedly
    Every {
        /// Events dropped between two forwarded ones
        skip: u32,
    },
    /// Drop the first `skip` events after start, then forward every one
    Settle {
        /// Events dropped before forwarding starts
        skip: u32,
    },
}

/// Statistics backpressure for AE and AWB interrupts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSkipConfig {
    /// Gate for AWB statistics interrupts
    pub awb: SkipGate,
    /// Gate for AE statistics interrupts
    pub ae: SkipGate,
}

impl FrameSkipConfig {
    /// Variant that derives AE from the AWB monitor: AWB counted down, the
    /// dedicated AE interrupt ignored.
    pub fn sc8825(skip: u32) -> Self {
        Self {
            awb: SkipGate::Every { skip },
            ae: SkipGate::Drop,
        }
    }

    /// Variant with separate AE interrupts: AWB always forwarded, AE after
    /// the sensor has settled.
    pub fn sc8830(settle: u32) -> Self {
        Self {
            awb: SkipGate::Forward,
            ae: SkipGate::Settle { skip: settle },
        }
    }
}

impl Default for FrameSkipConfig {
    fn default() -> Self {
        Self::sc8830(1)
    }
}

/// Autofocus sequencing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusConfig {
    /// Route AWB interrupts to the AF step while a sweep runs
    #[serde(default)]
    pub af_uses_awb_stats: bool,
    /// Frames between WB_TRIM and the window reaching hardware
    #[serde(default = "default_wb_trim_frames")]
    pub wb_trim_frames: u32,
    /// Frames between the end of a sweep and AE/AWB resuming
    #[serde(default = "default_awb_window_frames")]
    pub awb_window_frames: u32,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            af_uses_awb_stats: false,
            wb_trim_frames: default_wb_trim_frames(),
            awb_window_frames: default_awb_window_frames(),
        }
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_queue_capacity() -> usize {
    50
}

fn default_max_handles() -> usize {
    2
}

fn default_max_slice_width() -> u32 {
    2592
}

fn default_wb_trim_frames() -> u32 {
    3
}

fn default_awb_window_frames() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl IspConfig {
    /// Load defaults overridden by `ISP_CTRL_` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if extraction or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::base_figment())
    }

    /// Load defaults, then `path`, then environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file is malformed or validation fails.
    /// A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(IspConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ISP_CTRL_").split("__"));
        Self::extract(figment)
    }

    fn base_figment() -> Figment {
        Figment::from(Serialized::defaults(IspConfig::default()))
            .merge(Env::prefixed("ISP_CTRL_").split("__"))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns a ConfigError with a descriptive message for any validation failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        if self.runtime.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.queue_capacity must be at least 1".into(),
            ));
        }

        if self.runtime.max_handles == 0 || self.runtime.max_handles > MAX_HANDLE_SLOTS {
            return Err(ConfigError::ValidationError(format!(
                "runtime.max_handles {} must be between 1 and {MAX_HANDLE_SLOTS}",
                self.runtime.max_handles
            )));
        }

        if self.runtime.max_slice_width == 0 || self.runtime.max_slice_width % 2 != 0 {
            return Err(ConfigError::ValidationError(format!(
                "runtime.max_slice_width {} must be a non-zero even number",
                self.runtime.max_slice_width
            )));
        }

        if self.focus.wb_trim_frames == 0 || self.focus.awb_window_frames == 0 {
            return Err(ConfigError::ValidationError(
                "focus frame counts must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = IspConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.runtime.queue_capacity, 50);
        assert_eq!(config.frame_skip, FrameSkipConfig::sc8830(1));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = IspConfig::default();
        config.logging.level = "verbose".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = IspConfig::default();
        config.runtime.max_slice_width = 1001;
        assert!(config.validate().is_err());

        let mut config = IspConfig::default();
        config.runtime.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = IspConfig::default();
        config.runtime.max_handles = MAX_HANDLE_SLOTS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[runtime]
queue_capacity = 16

[frame_skip]
awb = {{ mode = "every", skip = 2 }}
ae = {{ mode = "drop" }}

[focus]
af_uses_awb_stats = true
"#
        )
        .unwrap();

        let config = IspConfig::load_from(file.path()).unwrap();
        assert_eq!(config.runtime.queue_capacity, 16);
        assert_eq!(config.runtime.max_handles, 2);
        assert_eq!(config.frame_skip, FrameSkipConfig::sc8825(2));
        assert!(config.focus.af_uses_awb_stats);
        assert_eq!(config.focus.wb_trim_frames, 3);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("ISP_CTRL_LOGGING__LEVEL", "debug");
        let config = IspConfig::load();
        std::env::remove_var("ISP_CTRL_LOGGING__LEVEL");
        assert_eq!(config.unwrap().logging.level, "debug");
    }

    #[test]
    #[serial]
    fn test_invalid_file_value_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime]\nmax_handles = 0").unwrap();
        assert!(matches!(
            IspConfig::load_from(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
