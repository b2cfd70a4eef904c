use anyhow::{bail, Context, Result};
use augment::DEFAULT_ROTATION_RANGE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for all `digitprep` commands.
///
/// Every field has a default, so a configuration file only needs the values it changes.
///
/// # Example
///
/// ```json
/// {
///   "rotation": { "min_degrees": -10.0, "max_degrees": 10.0, "seed": 7 },
///   "convert": { "sharpen": false }
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct PrepConfig {
    pub rotation: RotationConfig,
    pub recover: RecoverConfig,
    pub convert: ConvertConfig,
}

/// Settings for the random rotation augmentation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RotationConfig {
    /// Smallest angle, in degrees, a sample may be rotated by
    pub min_degrees: f64,
    /// Largest angle, in degrees, a sample may be rotated by
    pub max_degrees: f64,
    /// Seed for the random source. When absent the source is seeded from the OS.
    pub seed: Option<u64>,
    /// Suffix appended to the input file names
    pub suffix: String,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            min_degrees: *DEFAULT_ROTATION_RANGE.start(),
            max_degrees: *DEFAULT_ROTATION_RANGE.end(),
            seed: None,
            suffix: "rot".to_string(),
        }
    }
}

/// Settings for the EMNIST orientation recovery.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RecoverConfig {
    pub suffix: String,
}

impl Default for RecoverConfig {
    fn default() -> Self {
        Self {
            suffix: "rcv".to_string(),
        }
    }
}

/// Settings for converting an arbitrary image into a single MNIST sample.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConvertConfig {
    /// Side length of the square output image
    pub canvas_size: u32,
    /// Length the longest side of the digit is scaled to
    pub limit_len: u32,
    /// Crop the background margin around the digit before scaling
    pub crop_margin: bool,
    /// Pixels at or above this value are treated as pure white background
    pub background_threshold: Option<u8>,
    /// Apply a sharpening filter after scaling
    pub sharpen: bool,
    /// Also write a `.bmp` preview of the converted image
    pub write_preview: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            canvas_size: 28,
            limit_len: 20,
            crop_margin: true,
            background_threshold: Some(200),
            sharpen: true,
            write_preview: true,
        }
    }
}

impl PrepConfig {
    /// Loads a configuration from a JSON file and validates it.
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        let config: PrepConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Checks values that would otherwise only fail midway through a run.
    pub fn validate(&self) -> Result<()> {
        if self.rotation.suffix.is_empty() || self.recover.suffix.is_empty() {
            bail!("Output suffixes must not be empty");
        }
        let convert = &self.convert;
        if convert.limit_len == 0 {
            bail!("convert.limit_len must be positive");
        }
        if convert.limit_len > convert.canvas_size {
            bail!(
                "convert.limit_len ({}) must not exceed convert.canvas_size ({})",
                convert.limit_len,
                convert.canvas_size
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_defaults() {
        let config = PrepConfig::default();
        assert_eq!(
            config.rotation.min_degrees..=config.rotation.max_degrees,
            DEFAULT_ROTATION_RANGE
        );
        assert_eq!(config.rotation.suffix, "rot");
        assert_eq!(config.recover.suffix, "rcv");
        assert_eq!(config.convert.canvas_size, 28);
        assert_eq!(config.convert.limit_len, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() -> Result<(), Box<dyn std::error::Error>> {
        let temp = assert_fs::TempDir::new()?;
        let file = temp.child("config.json");
        file.write_str(r#"{ "rotation": { "max_degrees": 30.0, "seed": 5 }, "convert": { "sharpen": false } }"#)?;

        let config = PrepConfig::load(file.path())?;
        assert_eq!(config.rotation.min_degrees, -15.0);
        assert_eq!(config.rotation.max_degrees, 30.0);
        assert_eq!(config.rotation.seed, Some(5));
        assert!(!config.convert.sharpen);
        assert!(config.convert.crop_margin);
        assert_eq!(config.recover, RecoverConfig::default());

        Ok(())
    }

    #[test]
    fn test_load_rejects_invalid_values() -> Result<(), Box<dyn std::error::Error>> {
        let temp = assert_fs::TempDir::new()?;
        let file = temp.child("config.json");
        file.write_str(r#"{ "convert": { "limit_len": 40 } }"#)?;

        let err = PrepConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("must not exceed"));

        Ok(())
    }

    #[test]
    fn test_load_reports_path_on_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let temp = assert_fs::TempDir::new()?;
        let file = temp.child("broken.json");
        file.write_str("{ not json")?;

        let err = PrepConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("broken.json"));

        Ok(())
    }

    #[test]
    fn test_load_or_default_without_path() {
        assert_eq!(PrepConfig::load_or_default(None).unwrap(), PrepConfig::default());
    }
}
