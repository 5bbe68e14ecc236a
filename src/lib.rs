//! Runhook - run-result recording for instrumented test methods
//!
//! This library correlates hook events fired by an instrumentation layer
//! (root-method begin/end, per-line begin/end, thrown errors) with a logical
//! source model, and records one run result per executed root method:
//! elapsed time, failures with stack traces rewritten to logical source
//! coordinates, and screenshots selected by per-method capture policies.
//!
//! # Example
//!
//! ```no_run
//! use runhook::config::HookConfig;
//! use runhook::hook_dispatcher::HookDispatcher;
//! use runhook::source_model::SourceModel;
//! use runhook::stack_lines::{NativeFrame, StackSource};
//! use std::sync::Arc;
//!
//! struct RuntimeStack;
//!
//! impl StackSource for RuntimeStack {
//!     fn current_stack(&self) -> Vec<NativeFrame> {
//!         Vec::new() // supplied by the instrumented runtime
//!     }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let model = SourceModel::from_file("source-model.json")?;
//! let config = HookConfig::from_file("runhook.toml")?;
//! let mut hooks = HookDispatcher::new(Arc::new(model), RuntimeStack, &config);
//!
//! hooks.begin_root("pkg.LoginTest", "run", "run")?;
//! hooks.begin_line("pkg.LoginTest", "run", "run", "", 12, 12)?;
//! hooks.end_line("pkg.LoginTest", "run", "run", "", 12, 12)?;
//! hooks.end_root("pkg.LoginTest", "run")?;
//! # Ok(())
//! # }
//! ```

pub mod capture_decision;
pub mod clock;
pub mod config;
pub mod error;
pub mod hook_dispatcher;
pub mod report_paths;
pub mod result_sink;
pub mod run_result;
pub mod screen_capture;
pub mod source_model;
pub mod stack_lines;

pub use error::{HookError, Result};
