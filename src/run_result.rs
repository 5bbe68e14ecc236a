//! Run result of one root-method execution
//!
//! `RootMethodRunResult` accumulates failures and screen captures in arrival
//! order while a session is live. At session end it is converted once into a
//! `RunResultDocument`, the serializable tree handed to the result sink.

use crate::source_model::LogicalMethod;
use crate::stack_lines::LogicalStackFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Elapsed time attached to a screen capture
///
/// Serialized as milliseconds, with `-1` for captures taken at a failure point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ExecutionTime {
    Elapsed(u64),
    FailurePoint,
}

impl From<ExecutionTime> for i64 {
    fn from(time: ExecutionTime) -> Self {
        match time {
            ExecutionTime::Elapsed(ms) => i64::try_from(ms).unwrap_or(i64::MAX),
            ExecutionTime::FailurePoint => -1,
        }
    }
}

impl From<i64> for ExecutionTime {
    fn from(ms: i64) -> Self {
        u64::try_from(ms).map_or(ExecutionTime::FailurePoint, ExecutionTime::Elapsed)
    }
}

/// An error raised by the root method
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub message: String,
    /// Raw runtime trace text
    pub stack_trace: String,
    pub stack_lines: Vec<LogicalStackFrame>,
}

/// A screenshot together with the code location it documents
#[derive(Debug, Clone)]
pub struct LineScreenCapture {
    pub path: PathBuf,
    pub stack_lines: Vec<LogicalStackFrame>,
    pub execution_time: ExecutionTime,
}

/// Result of one root-method run, filled incrementally
#[derive(Debug, Clone)]
pub struct RootMethodRunResult {
    root_method: Arc<LogicalMethod>,
    execution_time: Option<u64>,
    run_failures: Vec<RunFailure>,
    line_screen_captures: Vec<LineScreenCapture>,
}

impl RootMethodRunResult {
    pub fn new(root_method: Arc<LogicalMethod>) -> Self {
        Self {
            root_method,
            execution_time: None,
            run_failures: Vec::new(),
            line_screen_captures: Vec::new(),
        }
    }

    pub fn root_method(&self) -> &Arc<LogicalMethod> {
        &self.root_method
    }

    pub fn add_run_failure(&mut self, failure: RunFailure) {
        self.run_failures.push(failure);
    }

    pub fn add_line_screen_capture(&mut self, capture: LineScreenCapture) {
        self.line_screen_captures.push(capture);
    }

    pub fn run_failures(&self) -> &[RunFailure] {
        &self.run_failures
    }

    pub fn line_screen_captures(&self) -> &[LineScreenCapture] {
        &self.line_screen_captures
    }

    /// Total elapsed milliseconds, once the run has finished
    pub fn execution_time(&self) -> Option<u64> {
        self.execution_time
    }

    /// Record the total elapsed time; later calls are ignored
    pub fn finish(&mut self, execution_time_ms: u64) {
        if self.execution_time.is_none() {
            self.execution_time = Some(execution_time_ms);
        }
    }

    /// Convert to the serializable document, preserving arrival order
    pub fn to_document(&self) -> RunResultDocument {
        RunResultDocument {
            root_method_key: self.root_method.key().to_string(),
            execution_time: self.execution_time.unwrap_or(0),
            run_failures: self
                .run_failures
                .iter()
                .map(|f| RunFailureDocument {
                    message: f.message.clone(),
                    stack_trace: f.stack_trace.clone(),
                    stack_lines: stack_line_documents(&f.stack_lines),
                })
                .collect(),
            line_screen_captures: self
                .line_screen_captures
                .iter()
                .map(|c| LineScreenCaptureDocument {
                    path: path_string(&c.path),
                    stack_lines: stack_line_documents(&c.stack_lines),
                    execution_time: c.execution_time,
                })
                .collect(),
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn stack_line_documents(frames: &[LogicalStackFrame]) -> Vec<StackLineDocument> {
    frames
        .iter()
        .map(|frame| StackLineDocument {
            method_key: frame.method().key().to_string(),
            class_key: frame.method().class_key().to_string(),
            method_name: frame.method().simple_name().to_string(),
            code_body_index: frame.code_body_index(),
            line: frame.line(),
        })
        .collect()
}

/// Serialized form of a run result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResultDocument {
    pub root_method_key: String,
    /// Total elapsed time in milliseconds
    pub execution_time: u64,
    pub run_failures: Vec<RunFailureDocument>,
    pub line_screen_captures: Vec<LineScreenCaptureDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailureDocument {
    pub message: String,
    pub stack_trace: String,
    pub stack_lines: Vec<StackLineDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineScreenCaptureDocument {
    pub path: String,
    pub stack_lines: Vec<StackLineDocument>,
    pub execution_time: ExecutionTime,
}

/// One logical frame, innermost first within its list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackLineDocument {
    pub method_key: String,
    pub class_key: String,
    pub method_name: String,
    pub code_body_index: usize,
    pub line: u32,
}
