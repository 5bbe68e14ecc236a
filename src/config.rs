//! Configuration for run-result recording
//!
//! Loaded from TOML. Every field has a default, so an empty file is valid.
//!
//! # Example
//! ```
//! use runhook::config::HookConfig;
//!
//! let config = HookConfig::from_toml_str(r#"
//!     report_intermediate_data_dir = "build/report-data"
//!     capture_extension = "png"
//! "#).unwrap();
//! assert!(config.pretty_results);
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Directory receiving run results and screen captures
    pub report_intermediate_data_dir: PathBuf,

    /// File extension of screen capture files, matching what the capture
    /// collaborator produces
    ///
    /// Default: "png"
    pub capture_extension: String,

    /// Pretty-print run result documents
    ///
    /// Default: true
    pub pretty_results: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            report_intermediate_data_dir: PathBuf::from("report-intermediate-data"),
            capture_extension: "png".to_string(),
            pretty_results: true,
        }
    }
}

impl HookConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read config file: {}", path_ref.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path_ref.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: HookConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.report_intermediate_data_dir.as_os_str().is_empty() {
            return Err("report_intermediate_data_dir must not be empty".to_string());
        }

        if self.capture_extension.is_empty()
            || !self
                .capture_extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(format!(
                "capture_extension must be non-empty ASCII alphanumerics, got {:?}",
                self.capture_extension
            ));
        }

        Ok(())
    }
}
