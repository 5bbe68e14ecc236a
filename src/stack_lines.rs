//! Native call stack → logical source stack mapping
//!
//! The instrumentation layer reports call stacks in runtime coordinates
//! (class, method, line). This module rewrites such a stack into frames bound
//! to statements of the logical source model, dropping every frame the model
//! does not know.
//!
//! A [`FrameRewrite`] strategy is applied once per native frame before it is
//! resolved. Two concrete rules exist:
//! - [`RootNameRelabel`]: the runtime name of the root method may differ from
//!   its logical name (adapter-wrapped or generated methods)
//! - [`PinpointSubstitution`]: the frame of the hook call site itself is
//!   attributed to the logical name and line the hook reported
//!
//! Rules compose as tuples: `(first, second)` applies `first`, then `second`.

use crate::source_model::{LogicalMethod, SourceModelIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A frame of the runtime call stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeFrame {
    /// Qualified class name
    pub class_name: String,
    /// Method name as seen by the runtime
    pub method_name: String,
    /// Source line number (0 if unknown)
    pub line: u32,
}

impl NativeFrame {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>, line: u32) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            line,
        }
    }
}

/// Provides the current runtime call stack, innermost frame first
pub trait StackSource {
    fn current_stack(&self) -> Vec<NativeFrame>;

    /// Current stack depth, used to tell recursive calls of one line apart
    fn depth(&self) -> usize {
        self.current_stack().len()
    }
}

/// Per-frame rewrite applied before a native frame is resolved
pub trait FrameRewrite {
    fn rewrite(&self, frame: NativeFrame) -> NativeFrame;
}

/// Leaves every frame untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRewrite;

impl FrameRewrite for NoRewrite {
    fn rewrite(&self, frame: NativeFrame) -> NativeFrame {
        frame
    }
}

impl<A: FrameRewrite, B: FrameRewrite> FrameRewrite for (A, B) {
    fn rewrite(&self, frame: NativeFrame) -> NativeFrame {
        self.1.rewrite(self.0.rewrite(frame))
    }
}

/// Renames frames of the actual root method to its logical name
#[derive(Debug, Clone)]
pub struct RootNameRelabel {
    pub actual_name: String,
    pub logical_name: String,
}

impl FrameRewrite for RootNameRelabel {
    fn rewrite(&self, mut frame: NativeFrame) -> NativeFrame {
        if frame.method_name == self.actual_name {
            frame.method_name.clone_from(&self.logical_name);
        }
        frame
    }
}

/// Replaces the frame at `(actual_name, actual_line)` with `(name, line)`
#[derive(Debug, Clone)]
pub struct PinpointSubstitution {
    pub actual_name: String,
    pub actual_line: u32,
    pub name: String,
    pub line: u32,
}

impl FrameRewrite for PinpointSubstitution {
    fn rewrite(&self, mut frame: NativeFrame) -> NativeFrame {
        if frame.method_name == self.actual_name && frame.line == self.actual_line {
            frame.method_name.clone_from(&self.name);
            frame.line = self.line;
        }
        frame
    }
}

/// A stack frame bound to a statement of the logical source model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalStackFrame {
    method: Arc<LogicalMethod>,
    code_body_index: usize,
    line: u32,
}

impl LogicalStackFrame {
    pub fn new(method: Arc<LogicalMethod>, code_body_index: usize, line: u32) -> Self {
        Self {
            method,
            code_body_index,
            line,
        }
    }

    pub fn method(&self) -> &Arc<LogicalMethod> {
        &self.method
    }

    pub fn code_body_index(&self) -> usize {
        self.code_body_index
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Same method, pointing at another statement
    pub fn with_position(&self, code_body_index: usize, line: u32) -> Self {
        Self {
            method: Arc::clone(&self.method),
            code_body_index,
            line,
        }
    }
}

/// Map a native stack (innermost first) to logical frames
///
/// Frames whose method is not in the model, or whose line is outside every
/// statement of every overload, are omitted.
pub fn map_stack<I, R>(index: &I, frames: &[NativeFrame], rewrite: &R) -> Vec<LogicalStackFrame>
where
    I: SourceModelIndex + ?Sized,
    R: FrameRewrite + ?Sized,
{
    frames
        .iter()
        .filter_map(|frame| {
            let frame = rewrite.rewrite(frame.clone());
            resolve_frame(index, &frame)
        })
        .collect()
}

fn resolve_frame<I>(index: &I, frame: &NativeFrame) -> Option<LogicalStackFrame>
where
    I: SourceModelIndex + ?Sized,
{
    index
        .lookup_methods_by_name(&frame.class_name, &frame.method_name)
        .into_iter()
        .find_map(|method| {
            let code_body_index = method.statement_index_for_line(frame.line)?;
            Some(LogicalStackFrame::new(method, code_body_index, frame.line))
        })
}
