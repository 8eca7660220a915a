//! Analyzer run configuration
//!
//! Values come from an optional TOML file; command-line flags are applied on
//! top by the binary.

use crate::error::{AnalyzerError, Result};
use crate::log_record::LogFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for one analysis run
///
/// # Example
/// ```
/// use tli_analyzer::config::AnalyzerConfig;
/// use tli_analyzer::log_record::LogFormat;
///
/// let config = AnalyzerConfig::default();
/// assert_eq!(config.log_format, LogFormat::Systemd);
/// assert!(config.sort);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Input dialect
    pub log_format: LogFormat,

    /// Sort input latest-first before correlating
    ///
    /// Disable only for input that is already in strict reverse
    /// chronological order; unsorted input silently degrades resolution.
    pub sort: bool,

    /// Keep every raw line that contributed to a chain
    pub collect_details: bool,

    /// Write all report artifacts here instead of printing one to stdout
    pub output_dir: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Systemd,
            sort: true,
            collect_details: false,
            output_dir: None,
        }
    }
}

impl AnalyzerConfig {
    /// Load a configuration file; absent keys keep their defaults
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AnalyzerError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| AnalyzerError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| AnalyzerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.output_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(AnalyzerError::Config(format!(
                    "output_dir {} exists and is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}
