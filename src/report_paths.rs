//! Output locations for run results and screen captures
//!
//! Class and method identifiers may contain characters that are illegal in
//! file names (generated method names, for instance), so every identifier is
//! hex-encoded before it becomes a path segment.

use crate::config::HookConfig;
use std::path::{Path, PathBuf};

const RUN_RESULTS_DIR: &str = "run-results";
const CAPTURES_DIR: &str = "captures";

/// Deterministic, ASCII-only file name for an arbitrary identifier
pub fn safe_file_name(name: &str) -> String {
    hex::encode(name.as_bytes())
}

/// Inverse of [`safe_file_name`], `None` for names it never produces
pub fn decode_safe_file_name(encoded: &str) -> Option<String> {
    let bytes = hex::decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Root directories for everything written during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    run_results_root: PathBuf,
    capture_root: PathBuf,
    capture_extension: String,
}

impl ReportPaths {
    pub fn new(
        run_results_root: impl Into<PathBuf>,
        capture_root: impl Into<PathBuf>,
        capture_extension: impl Into<String>,
    ) -> Self {
        Self {
            run_results_root: run_results_root.into(),
            capture_root: capture_root.into(),
            capture_extension: capture_extension.into(),
        }
    }

    /// Lay out both roots under the configured intermediate data directory
    pub fn from_config(config: &HookConfig) -> Self {
        let base = &config.report_intermediate_data_dir;
        Self::new(
            base.join(RUN_RESULTS_DIR),
            base.join(CAPTURES_DIR),
            config.capture_extension.clone(),
        )
    }

    pub fn run_results_root(&self) -> &Path {
        &self.run_results_root
    }

    pub fn capture_root(&self) -> &Path {
        &self.capture_root
    }

    /// `<run-results>/<class>/<method>`
    pub fn run_result_file(&self, class_key: &str, method_name: &str) -> PathBuf {
        self.run_results_root
            .join(safe_file_name(class_key))
            .join(safe_file_name(method_name))
    }

    /// `<captures>/<class>/<method>`
    pub fn capture_dir(&self, class_key: &str, method_name: &str) -> PathBuf {
        self.capture_root
            .join(safe_file_name(class_key))
            .join(safe_file_name(method_name))
    }

    /// `<captures>/<class>/<method>/NNN.<ext>`
    pub fn capture_file(&self, class_key: &str, method_name: &str, sequence: u32) -> PathBuf {
        self.capture_dir(class_key, method_name)
            .join(format!("{:03}.{}", sequence, self.capture_extension))
    }
}
