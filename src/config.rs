// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::LensFacing;
use crate::constants::{
    APP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_JPEG_QUALITY, DEFAULT_ROTATION_DEGREES,
    STILL_SINK_MAX_IMAGES, timeouts,
};
use crate::errors::ConfigError;
use crate::pipelines::photo::{EncodingFormat, ProcessorOptions, Rotation};
use crate::session::SessionConfig;
use crate::storage::{FileNaming, default_output_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// User configuration
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which camera to open
    pub facing: LensFacing,
    /// Handoff directory (`None` = pictures directory)
    pub output_dir: Option<PathBuf>,
    /// Output file naming
    pub file_naming: FileNaming,
    /// Output container
    pub output_format: EncodingFormat,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Clockwise rotation applied to every capture (0, 90, 180, 270)
    pub rotation_degrees: u32,
    /// Device-open completion timeout
    pub open_timeout_ms: u64,
    /// Session-configure completion timeout
    pub configure_timeout_ms: u64,
    /// Image-available completion timeout
    pub capture_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            facing: LensFacing::Back,
            output_dir: None,
            file_naming: FileNaming::default(),
            output_format: EncodingFormat::Jpeg,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            rotation_degrees: DEFAULT_ROTATION_DEGREES,
            open_timeout_ms: timeouts::OPEN.as_millis() as u64,
            configure_timeout_ms: timeouts::CONFIGURE.as_millis() as u64,
            capture_timeout_ms: timeouts::CAPTURE.as_millis() as u64,
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation().is_none() {
            return Err(ConfigError::Invalid(format!(
                "rotation_degrees must be 0, 90, 180 or 270 (got {})",
                self.rotation_degrees
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be between 1 and 100 (got {})",
                self.jpeg_quality
            )));
        }
        if self.open_timeout_ms == 0
            || self.configure_timeout_ms == 0
            || self.capture_timeout_ms == 0
        {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if let FileNaming::Fixed { file_name } = &self.file_naming
            && (file_name.is_empty() || file_name.contains(['/', '\\']))
        {
            return Err(ConfigError::Invalid(format!(
                "invalid output file name '{}'",
                file_name
            )));
        }
        Ok(())
    }

    fn rotation(&self) -> Option<Rotation> {
        i32::try_from(self.rotation_degrees)
            .ok()
            .and_then(Rotation::from_degrees)
            .filter(|_| self.rotation_degrees < 360)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            configure_timeout: Duration::from_millis(self.configure_timeout_ms),
            capture_timeout: Duration::from_millis(self.capture_timeout_ms),
            still_sink_max_images: STILL_SINK_MAX_IMAGES,
        }
    }

    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            rotation: self.rotation().unwrap_or_default(),
            format: self.output_format,
            jpeg_quality: self.jpeg_quality,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_capture_flow() {
        let config = Config::default();
        assert_eq!(config.facing, LensFacing::Back);
        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.processor_options().rotation, Rotation::Rotate90);
        assert_eq!(config.session_config(), SessionConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_odd_rotation() {
        let config = Config {
            rotation_degrees: 45,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            rotation_degrees: 450,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_path_in_file_name() {
        let config = Config {
            file_naming: FileNaming::Fixed {
                file_name: "../escape".into(),
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
