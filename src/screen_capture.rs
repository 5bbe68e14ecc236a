//! Screenshot collaborator and capture file writing

use crate::error::{HookError, Result};
use std::fs;
use std::io;
use std::path::Path;

/// Produces screenshots of the system under test
///
/// `Ok(None)` means no screen is available right now (no driver attached,
/// headless run), which is not an error.
pub trait ScreenCapturer {
    fn capture_screen(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Capturer for runs without any screen
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScreen;

impl ScreenCapturer for NoScreen {
    fn capture_screen(&mut self) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Write capture data, creating parent directories as needed
pub fn write_capture_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| HookError::io(parent, e))?;
    }
    fs::write(path, data).map_err(|e| HookError::io(path, e))
}
