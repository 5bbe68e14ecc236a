//! Persistence of finished run results

use crate::error::{HookError, Result};
use crate::run_result::RunResultDocument;
use anyhow::Context;
use std::fs;
use std::path::Path;

/// Receives one serialized run result per finished root method
pub trait ResultSink {
    fn write(&mut self, document: &serde_json::Value, destination: &Path) -> Result<()>;
}

/// Writes run results as JSON files
#[derive(Debug, Clone, Copy)]
pub struct JsonFileSink {
    pretty: bool,
}

impl JsonFileSink {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl Default for JsonFileSink {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ResultSink for JsonFileSink {
    fn write(&mut self, document: &serde_json::Value, destination: &Path) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(document)?
        } else {
            serde_json::to_string(document)?
        };
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| HookError::io(parent, e))?;
        }
        fs::write(destination, json).map_err(|e| HookError::io(destination, e))
    }
}

/// Read back a run result written by [`JsonFileSink`]
pub fn load_run_result<P: AsRef<Path>>(path: P) -> anyhow::Result<RunResultDocument> {
    let path_ref = path.as_ref();
    let contents = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read run result: {}", path_ref.display()))?;
    serde_json::from_str(&contents).context("Invalid run result JSON")
}
