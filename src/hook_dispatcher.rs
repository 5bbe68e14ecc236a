//! Entry point for instrumentation hook events
//!
//! The instrumentation layer calls five hooks while a test runs:
//!
//! ```text
//! begin_root ──► begin_line / end_line (nested, any depth) ──► [on_error] ──► end_root
//! ```
//!
//! A `HookDispatcher` tracks at most one in-flight root method as a
//! [`RunSession`]. Events arriving outside a session, or naming a method other
//! than the session's root method, are ignored. Running root methods
//! concurrently needs one dispatcher per thread of execution; the dispatcher
//! does no locking.

use crate::capture_decision::{self, CaptureDecision, CaptureTarget, LineTiming};
use crate::clock::{Clock, SystemClock};
use crate::config::HookConfig;
use crate::error::{HookError, Result};
use crate::report_paths::ReportPaths;
use crate::result_sink::{JsonFileSink, ResultSink};
use crate::run_result::{ExecutionTime, LineScreenCapture, RootMethodRunResult, RunFailure};
use crate::screen_capture::{write_capture_file, NoScreen, ScreenCapturer};
use crate::source_model::{method_key, LogicalMethod, SourceModelIndex};
use crate::stack_lines::{
    map_stack, NativeFrame, PinpointSubstitution, RootNameRelabel, StackSource,
};
use fnv::FnvHashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SESSION_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one root-method run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

impl SessionToken {
    fn next() -> Self {
        Self(NEXT_SESSION_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// Logical class and simple name of a root method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootIdentity {
    pub class_key: String,
    pub simple_name: String,
}

impl RootIdentity {
    fn of(method: &LogicalMethod) -> Self {
        Self {
            class_key: method.class_key().to_string(),
            simple_name: method.simple_name().to_string(),
        }
    }

    pub fn matches(&self, class_key: &str, simple_name: &str) -> bool {
        self.class_key == class_key && self.simple_name == simple_name
    }
}

/// An error thrown out of the root method
#[derive(Debug, Clone)]
pub struct HookedError {
    /// Qualified type name of the error
    pub type_name: String,
    pub message: String,
    /// Raw trace text as printed by the runtime
    pub stack_trace: String,
    /// Call stack at the throw site, innermost first
    pub frames: Vec<NativeFrame>,
}

impl HookedError {
    pub fn failure_message(&self) -> String {
        format!("{}: {}", self.type_name, self.message)
    }
}

/// Single-entry memo for method lookups by key
///
/// Consecutive line hooks nearly always come from the same method. Misses
/// are memoized too.
#[derive(Debug, Default)]
struct MethodMemo {
    last_key: Option<String>,
    last_method: Option<Arc<LogicalMethod>>,
}

impl MethodMemo {
    fn lookup(&mut self, index: &dyn SourceModelIndex, key: String) -> Option<Arc<LogicalMethod>> {
        if self.last_key.as_deref() != Some(key.as_str()) {
            self.last_method = index.lookup_method_by_key(&key);
            self.last_key = Some(key);
        }
        self.last_method.clone()
    }
}

/// State of the in-flight root-method run
#[derive(Debug)]
pub struct RunSession {
    token: SessionToken,
    identity: RootIdentity,
    actual_root_method_name: String,
    capture_sequence: u32,
    start_time: u64,
    step_label_start_time: u64,
    pending_line_timers: FnvHashMap<String, u64>,
    memo: MethodMemo,
    result: RootMethodRunResult,
}

impl RunSession {
    fn new(root_method: Arc<LogicalMethod>, actual_root_method_name: &str, now: u64) -> Self {
        Self {
            token: SessionToken::next(),
            identity: RootIdentity::of(&root_method),
            actual_root_method_name: actual_root_method_name.to_string(),
            capture_sequence: 1,
            start_time: now,
            step_label_start_time: now,
            pending_line_timers: FnvHashMap::default(),
            memo: MethodMemo::default(),
            result: RootMethodRunResult::new(root_method),
        }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn identity(&self) -> &RootIdentity {
        &self.identity
    }

    /// Sequence number the next screenshot will get
    pub fn capture_sequence(&self) -> u32 {
        self.capture_sequence
    }

    pub fn pending_line_count(&self) -> usize {
        self.pending_line_timers.len()
    }

    pub fn result(&self) -> &RootMethodRunResult {
        &self.result
    }

    fn root_name_relabel(&self) -> RootNameRelabel {
        RootNameRelabel {
            actual_name: self.actual_root_method_name.clone(),
            logical_name: self.identity.simple_name.clone(),
        }
    }
}

/// Timer key of one code line execution
///
/// The stack depth tells recursive calls reusing the same line apart.
fn line_key(class_key: &str, method_name: &str, args: &str, line: u32, depth: usize) -> String {
    format!("{}_{}_{}_{}_{}", class_key, method_name, args, line, depth)
}

/// Correlates hook events into run results
pub struct HookDispatcher {
    index: Arc<dyn SourceModelIndex>,
    stack: Box<dyn StackSource>,
    screen: Box<dyn ScreenCapturer>,
    sink: Box<dyn ResultSink>,
    clock: Box<dyn Clock>,
    paths: ReportPaths,
    session: Option<RunSession>,
}

impl HookDispatcher {
    /// Dispatcher writing JSON results under the configured directory, with
    /// no screen and the system clock
    pub fn new(
        index: Arc<dyn SourceModelIndex>,
        stack: impl StackSource + 'static,
        config: &HookConfig,
    ) -> Self {
        Self {
            index,
            stack: Box::new(stack),
            screen: Box::new(NoScreen),
            sink: Box::new(JsonFileSink::new(config.pretty_results)),
            clock: Box::new(SystemClock::new()),
            paths: ReportPaths::from_config(config),
            session: None,
        }
    }

    pub fn with_screen(mut self, screen: impl ScreenCapturer + 'static) -> Self {
        self.screen = Box::new(screen);
        self
    }

    pub fn with_sink(mut self, sink: impl ResultSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn paths(&self) -> &ReportPaths {
        &self.paths
    }

    pub fn session(&self) -> Option<&RunSession> {
        self.session.as_ref()
    }

    pub fn active_token(&self) -> Option<SessionToken> {
        self.session.as_ref().map(RunSession::token)
    }

    /// Discard the in-flight run without persisting anything
    pub fn abandon(&mut self) -> Option<SessionToken> {
        let session = self.session.take()?;
        tracing::info!(
            "abandoned run of {}.{}",
            session.identity.class_key,
            session.identity.simple_name
        );
        Some(session.token)
    }

    /// Start a session if the hooked method is a root method
    ///
    /// Returns the new session's token, or `None` when the event was ignored.
    pub fn begin_root(
        &mut self,
        class_key: &str,
        method_name: &str,
        actual_method_name: &str,
    ) -> Result<Option<SessionToken>> {
        if self.session.is_some() {
            tracing::debug!("begin_root {}: session already active", method_name);
            return Ok(None);
        }

        let mut roots = self.index.lookup_root_methods_by_name(class_key, method_name);
        let root_method = match roots.len() {
            0 => {
                tracing::debug!("begin_root {}.{}: not a root method", class_key, method_name);
                return Ok(None);
            }
            1 => roots.remove(0),
            count => {
                return Err(HookError::AmbiguousRootMethod {
                    class: class_key.to_string(),
                    method: method_name.to_string(),
                    count,
                })
            }
        };

        tracing::info!("begin_root: {}", method_name);
        let session = RunSession::new(root_method, actual_method_name, self.clock.now_millis());
        let token = session.token;
        self.session = Some(session);
        Ok(Some(token))
    }

    /// Finish the session and persist its run result
    pub fn end_root(&mut self, class_key: &str, method_name: &str) -> Result<()> {
        match &self.session {
            Some(session) if session.identity.matches(class_key, method_name) => {}
            Some(_) => {
                tracing::debug!("end_root {}: not the current root method", method_name);
                return Ok(());
            }
            None => return Ok(()),
        }
        self.finish_session()
    }

    /// Token-based variant of [`HookDispatcher::end_root`]
    pub fn end_root_with_token(&mut self, token: SessionToken) -> Result<()> {
        if self.active_token() != Some(token) {
            tracing::debug!("end_root: stale session token {:?}", token);
            return Ok(());
        }
        self.finish_session()
    }

    fn finish_session(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let elapsed = self.clock.now_millis().saturating_sub(session.start_time);
        session.result.finish(elapsed);

        let document = serde_json::to_value(session.result.to_document())?;
        let identity = &session.identity;
        let destination = self
            .paths
            .run_result_file(&identity.class_key, &identity.simple_name);
        self.sink.write(&document, &destination)?;

        tracing::info!(
            "end_root: {} ({} ms, {} captures, {} failures)",
            identity.simple_name,
            elapsed,
            session.result.line_screen_captures().len(),
            session.result.run_failures().len()
        );
        Ok(())
    }

    /// Record an error thrown out of the root method
    ///
    /// Must be called before `end_root` of the same invocation. Takes one
    /// screenshot regardless of capture policies.
    pub fn on_error(
        &mut self,
        class_key: &str,
        method_name: &str,
        error: &HookedError,
    ) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if !session.identity.matches(class_key, method_name) {
            tracing::debug!("on_error {}: not the current root method", method_name);
            return Ok(());
        }

        let stack_lines = map_stack(&*self.index, &error.frames, &session.root_name_relabel());
        session.result.add_run_failure(RunFailure {
            message: error.failure_message(),
            stack_trace: error.stack_trace.clone(),
            stack_lines: stack_lines.clone(),
        });
        tracing::info!("on_error: {}", error.failure_message());

        let target = CaptureTarget {
            stack_lines,
            execution_time: ExecutionTime::FailurePoint,
        };
        capture_screen_for(&mut *self.screen, &self.paths, session, vec![target])?;
        Ok(())
    }

    /// A code line of a tracked method is about to run
    pub fn begin_line(
        &mut self,
        class_key: &str,
        method_name: &str,
        actual_method_name: &str,
        args: &str,
        line: u32,
        actual_line: u32,
    ) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let key = method_key(class_key, method_name, args);
        let Some(method) = session.memo.lookup(&*self.index, key) else {
            return Ok(());
        };
        tracing::debug!(
            "begin_line: {}: {}({}) [{}]",
            method_name,
            line,
            actual_line,
            actual_method_name
        );

        let now = self.clock.now_millis();
        match method.statement_index_for_line(line) {
            Some(index) => {
                let opens_block = method.is_step_label_at(index)
                    || (index > 0 && method.is_step_label_at(index - 1));
                if opens_block {
                    session.step_label_start_time = now;
                }
            }
            None => {
                tracing::warn!("line {} is outside every statement of {}", line, method.key())
            }
        }

        let timer_key = line_key(class_key, method_name, args, line, self.stack.depth());
        if session.pending_line_timers.contains_key(&timer_key) {
            return Err(HookError::DuplicateLineKey(timer_key));
        }
        session.pending_line_timers.insert(timer_key, now);
        Ok(())
    }

    /// A code line of a tracked method has completed
    pub fn end_line(
        &mut self,
        class_key: &str,
        method_name: &str,
        actual_method_name: &str,
        args: &str,
        line: u32,
        actual_line: u32,
    ) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let key = method_key(class_key, method_name, args);
        if session.memo.lookup(&*self.index, key).is_none() {
            return Ok(());
        }
        tracing::debug!(
            "end_line: {}: {}({}) [{}]",
            method_name,
            line,
            actual_line,
            actual_method_name
        );

        let timer_key = line_key(class_key, method_name, args, line, self.stack.depth());
        let Some(start) = session.pending_line_timers.remove(&timer_key) else {
            return Err(HookError::LineKeyNotFound(timer_key));
        };
        let now = self.clock.now_millis();
        let timing = LineTiming {
            line_elapsed_ms: now.saturating_sub(start),
            step_label_elapsed_ms: now.saturating_sub(session.step_label_start_time),
        };

        let rewrite = (
            PinpointSubstitution {
                actual_name: actual_method_name.to_string(),
                actual_line,
                name: method_name.to_string(),
                line,
            },
            session.root_name_relabel(),
        );
        let frames = self.stack.current_stack();
        let stack_lines = map_stack(&*self.index, &frames, &rewrite);

        match capture_decision::decide(&*self.index, stack_lines, timing)? {
            CaptureDecision::Skip(reason) => {
                tracing::debug!("end_line: skip capture ({:?})", reason);
            }
            CaptureDecision::Capture(targets) => {
                capture_screen_for(&mut *self.screen, &self.paths, session, targets)?;
            }
        }
        Ok(())
    }
}

/// Take one screenshot and attach it to every target
///
/// Returns the absolute capture file, or `None` when no screen was available.
fn capture_screen_for(
    screen: &mut dyn ScreenCapturer,
    paths: &ReportPaths,
    session: &mut RunSession,
    targets: Vec<CaptureTarget>,
) -> Result<Option<PathBuf>> {
    let root = session.result.root_method();
    let path = paths.capture_file(root.class_key(), root.simple_name(), session.capture_sequence);

    let Some(data) = screen
        .capture_screen()
        .map_err(|e| HookError::io(&path, e))?
    else {
        tracing::debug!("no screen available, capture skipped");
        return Ok(None);
    };

    session.capture_sequence += 1;
    write_capture_file(&path, &data)?;
    let path = std::path::absolute(&path).map_err(|e| HookError::io(&path, e))?;

    for target in targets {
        session.result.add_line_screen_capture(LineScreenCapture {
            path: path.clone(),
            stack_lines: target.stack_lines,
            execution_time: target.execution_time,
        });
    }
    tracing::info!("captured {}", path.display());
    Ok(Some(path))
}
