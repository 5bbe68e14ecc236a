// Shared test harness for driving a HookDispatcher with scripted collaborators
//
// The runtime stack, screen and result sink are replaced by in-memory fakes
// whose state the test keeps a handle to.

#![allow(dead_code)]

use runhook::clock::ManualClock;
use runhook::config::HookConfig;
use runhook::hook_dispatcher::HookDispatcher;
use runhook::result_sink::ResultSink;
use runhook::screen_capture::ScreenCapturer;
use runhook::source_model::{Code, SourceModel};
use runhook::stack_lines::{NativeFrame, StackSource};
use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Install a subscriber once; RUST_LOG controls verbosity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Runtime stack the test pushes and pops frames on
#[derive(Clone, Default)]
pub struct ScriptedStack {
    frames: Rc<RefCell<Vec<NativeFrame>>>,
}

impl ScriptedStack {
    /// Enter a call: the new frame becomes the innermost one
    pub fn push(&self, class_name: &str, method_name: &str, line: u32) {
        self.frames
            .borrow_mut()
            .insert(0, NativeFrame::new(class_name, method_name, line));
    }

    pub fn pop(&self) {
        self.frames.borrow_mut().remove(0);
    }

    /// Move the innermost frame to another line
    pub fn set_line(&self, line: u32) {
        if let Some(frame) = self.frames.borrow_mut().first_mut() {
            frame.line = line;
        }
    }
}

impl StackSource for ScriptedStack {
    fn current_stack(&self) -> Vec<NativeFrame> {
        self.frames.borrow().clone()
    }
}

/// Screen returning fixed bytes, or nothing when `available` is false
#[derive(Clone)]
pub struct FixedScreen {
    pub data: Vec<u8>,
    pub available: Rc<RefCell<bool>>,
    pub calls: Rc<RefCell<usize>>,
}

impl FixedScreen {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            available: Rc::new(RefCell::new(true)),
            calls: Rc::new(RefCell::new(0)),
        }
    }
}

impl ScreenCapturer for FixedScreen {
    fn capture_screen(&mut self) -> io::Result<Option<Vec<u8>>> {
        *self.calls.borrow_mut() += 1;
        if *self.available.borrow() {
            Ok(Some(self.data.clone()))
        } else {
            Ok(None)
        }
    }
}

/// Screen whose driver always fails
pub struct BrokenScreen;

impl ScreenCapturer for BrokenScreen {
    fn capture_screen(&mut self) -> io::Result<Option<Vec<u8>>> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "driver gone"))
    }
}

/// Sink keeping every written document in memory
#[derive(Clone, Default)]
pub struct MemorySink {
    pub written: Rc<RefCell<Vec<(PathBuf, serde_json::Value)>>>,
}

impl MemorySink {
    pub fn count(&self) -> usize {
        self.written.borrow().len()
    }

    pub fn last(&self) -> serde_json::Value {
        self.written
            .borrow()
            .last()
            .map(|(_, doc)| doc.clone())
            .expect("no run result written")
    }
}

impl ResultSink for MemorySink {
    fn write(&mut self, document: &serde_json::Value, destination: &Path) -> runhook::Result<()> {
        self.written
            .borrow_mut()
            .push((destination.to_path_buf(), document.clone()));
        Ok(())
    }
}

/// Dispatcher wired to fakes, plus handles to drive and inspect them
pub struct Harness {
    pub dispatcher: HookDispatcher,
    pub stack: ScriptedStack,
    pub screen: FixedScreen,
    pub sink: MemorySink,
    pub clock: ManualClock,
    pub temp_dir: TempDir,
}

impl Harness {
    pub fn new(model: SourceModel) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().unwrap();
        let config = HookConfig {
            report_intermediate_data_dir: temp_dir.path().to_path_buf(),
            ..HookConfig::default()
        };
        let stack = ScriptedStack::default();
        let screen = FixedScreen::new(b"\x89PNG fake");
        let sink = MemorySink::default();
        let clock = ManualClock::new(1_000);
        let dispatcher = HookDispatcher::new(Arc::new(model), stack.clone(), &config)
            .with_screen(screen.clone())
            .with_sink(sink.clone())
            .with_clock(clock.clone());
        Self {
            dispatcher,
            stack,
            screen,
            sink,
            clock,
            temp_dir,
        }
    }

    /// begin_line + end_line for a line whose runtime name and line equal
    /// the logical ones, taking `millis` in between
    pub fn run_line(&mut self, class_key: &str, method: &str, line: u32, millis: u64) {
        self.stack.set_line(line);
        self.dispatcher
            .begin_line(class_key, method, method, "", line, line)
            .unwrap();
        self.clock.advance(millis);
        self.dispatcher
            .end_line(class_key, method, method, "", line, line)
            .unwrap();
    }
}

pub fn plain() -> Code {
    Code::Plain {
        original: String::new(),
    }
}

pub fn label(name: &str) -> Code {
    Code::StepLabel {
        label: name.to_string(),
    }
}

pub fn invoke(key: &str) -> Code {
    Code::SubMethodInvoke {
        method_key: key.to_string(),
    }
}
