//! Runtime configuration
//!
//! Settings that change how a plan is applied rather than what it contains.
//! Stored as JSON so the same file can be shared with front ends.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// How plans are applied and logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Log every action instead of executing it
    pub dry_run: bool,
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize runtime configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.log_filter.trim().is_empty() {
            anyhow::bail!("Log filter must be specified");
        }

        EnvFilter::try_new(&self.log_filter)
            .with_context(|| format!("Invalid log filter '{}'", self.log_filter))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert!(!config.dry_run);
        assert_eq!(config.log_filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diskplan.json");
        let config = RuntimeConfig {
            dry_run: true,
            log_filter: "diskplan=debug".to_string(),
        };

        config.save_to_file(&path).unwrap();
        let loaded = RuntimeConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(br#"{ "dry_run": true }"#).unwrap();
        temp_file.flush().unwrap();

        let loaded = RuntimeConfig::load_from_file(temp_file.path()).unwrap();
        assert!(loaded.dry_run);
        assert_eq!(loaded.log_filter, "info");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = RuntimeConfig::load_from_file(Path::new("/nonexistent/diskplan.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{ invalid json }").unwrap();
        temp_file.flush().unwrap();

        let result = RuntimeConfig::load_from_file(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_empty_filter() {
        let config = RuntimeConfig {
            dry_run: false,
            log_filter: "   ".to_string(),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Log filter"));
    }

    #[test]
    fn test_validation_bad_filter() {
        let config = RuntimeConfig {
            dry_run: false,
            log_filter: "diskplan=notalevel".to_string(),
        };
        assert!(config.validate().is_err());
    }
}
