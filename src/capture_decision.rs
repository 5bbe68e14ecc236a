//! Screen capture decisions for completed code lines
//!
//! Three policies interact when a line completes:
//!
//! 1. Per-line eligibility: does the statement itself warrant a screenshot?
//! 2. Step-label aggregation: is the statement the last one of a step-label
//!    block, so the whole block gets a screenshot too?
//! 3. Step-in gating: does every caller between the line and the root method
//!    allow captures from inside it?
//!
//! One screenshot serves both the line and the block. Captures for a failure
//! bypass all three policies and are not decided here.

use crate::error::{HookError, Result};
use crate::run_result::ExecutionTime;
use crate::source_model::{CaptureStyle, Code, LogicalMethod, SourceModelIndex, Variable};
use crate::stack_lines::LogicalStackFrame;

/// A stack to attach the next screenshot to, with its elapsed time
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    pub stack_lines: Vec<LogicalStackFrame>,
    pub execution_time: ExecutionTime,
}

/// Why no screenshot is taken for a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The hooked line did not map to any logical frame
    EmptyStack,
    /// Neither the line nor an enclosing step-label block wants a capture
    NotEligible,
    /// An intermediate caller does not allow step-in captures
    StepInGated,
}

#[derive(Debug, Clone)]
pub enum CaptureDecision {
    Skip(SkipReason),
    /// Take one screenshot and attach it to every target, in order
    Capture(Vec<CaptureTarget>),
}

/// Elapsed times known when a line completes
#[derive(Debug, Clone, Copy)]
pub struct LineTiming {
    pub line_elapsed_ms: u64,
    pub step_label_elapsed_ms: u64,
}

/// Whether the statement at `frame` gets its own screenshot
pub fn captures_this_line<I>(index: &I, frame: &LogicalStackFrame) -> Result<bool>
where
    I: SourceModelIndex + ?Sized,
{
    let Some(code_line) = frame.method().code_line(frame.code_body_index()) else {
        return Ok(false);
    };

    match &code_line.code {
        Code::SubMethodInvoke { method_key } => {
            Ok(invoked_style(index, method_key).captures_invoking_line())
        }
        Code::VarAssign { variable, value } => match value.as_ref() {
            Code::SubMethodInvoke { method_key } => {
                Ok(invoked_style(index, method_key).captures_invoking_line())
            }
            _ => Ok(matches!(variable, Variable::Field { .. })),
        },
        Code::TestStep => Err(HookError::UnresolvedTestStep {
            method: frame.method().key().to_string(),
            index: frame.code_body_index(),
        }),
        Code::Plain { .. } | Code::StepLabel { .. } => Ok(false),
    }
}

fn invoked_style<I>(index: &I, method_key: &str) -> CaptureStyle
where
    I: SourceModelIndex + ?Sized,
{
    match index.lookup_method_by_key(method_key) {
        Some(method) => method.capture_style(),
        None => {
            tracing::warn!("invoked method {} is not in the source model", method_key);
            CaptureStyle::None
        }
    }
}

/// Index of the step-label marker opening the block that `index` closes
///
/// A statement closes a block when it is the last statement of the method or
/// the next statement is another step-label marker.
pub fn step_label_index_if_block_end(method: &LogicalMethod, index: usize) -> Option<usize> {
    let next = index + 1;
    if next < method.code_body().len() && !method.is_step_label_at(next) {
        return None;
    }
    (0..=index).rev().find(|&i| method.is_step_label_at(i))
}

/// Whether captures may be taken at the innermost frame of `stack`
///
/// Every frame except the outermost (root) one must belong to a method that
/// opts into step-in captures.
pub fn can_step_in_capture_to(stack: &[LogicalStackFrame]) -> bool {
    match stack.split_last() {
        Some((_root, callers)) => callers
            .iter()
            .all(|frame| frame.method().capture_style().allows_step_in()),
        None => true,
    }
}

/// Decide what to capture for a completed line
///
/// `stack` is the logical stack at the hook site, innermost first.
pub fn decide<I>(
    index: &I,
    stack: Vec<LogicalStackFrame>,
    timing: LineTiming,
) -> Result<CaptureDecision>
where
    I: SourceModelIndex + ?Sized,
{
    let Some(top) = stack.first() else {
        return Ok(CaptureDecision::Skip(SkipReason::EmptyStack));
    };

    let captures_line = captures_this_line(index, top)?;

    let step_label_stack = step_label_index_if_block_end(top.method(), top.code_body_index())
        .and_then(|label_index| {
            let label_line = top.method().code_line(label_index)?.start_line;
            let mut label_stack = stack.clone();
            label_stack[0] = top.with_position(label_index, label_line);
            Some(label_stack)
        });

    if !captures_line && step_label_stack.is_none() {
        return Ok(CaptureDecision::Skip(SkipReason::NotEligible));
    }

    if !can_step_in_capture_to(&stack) {
        return Ok(CaptureDecision::Skip(SkipReason::StepInGated));
    }

    let mut targets = Vec::with_capacity(2);
    if captures_line {
        targets.push(CaptureTarget {
            stack_lines: stack,
            execution_time: ExecutionTime::Elapsed(timing.line_elapsed_ms),
        });
    }
    if let Some(stack_lines) = step_label_stack {
        targets.push(CaptureTarget {
            stack_lines,
            execution_time: ExecutionTime::Elapsed(timing.step_label_elapsed_ms),
        });
    }
    Ok(CaptureDecision::Capture(targets))
}
