//! Logical source model consumed by the hook correlator
//!
//! The model is built by an earlier stage from test source code. This module
//! defines the read-only view the correlator needs (`SourceModelIndex`) and an
//! in-memory implementation that can be assembled programmatically or loaded
//! from a versioned JSON file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Source model file format version (currently only v1 supported)
const SUPPORTED_VERSION: u32 = 1;

/// Per-method screenshot policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureStyle {
    /// Never capture for calls to this method
    None,
    /// Capture once the line calling this method completes
    #[default]
    ThisLine,
    /// Capture the calling line and let lines inside the method capture too
    StepIn,
    /// Let lines inside the method capture, but not the calling line
    StepInOnly,
}

impl CaptureStyle {
    /// Whether a line invoking a method with this style gets its own screenshot
    pub fn captures_invoking_line(self) -> bool {
        matches!(self, CaptureStyle::ThisLine | CaptureStyle::StepIn)
    }

    /// Whether lines inside a method with this style may be captured
    pub fn allows_step_in(self) -> bool {
        matches!(self, CaptureStyle::StepIn | CaptureStyle::StepInOnly)
    }
}

/// Assignment target of a variable-assignment statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Variable {
    Local { name: String },
    Field { name: String },
}

/// Statement variants the correlator distinguishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Code {
    /// Any statement with no capture meaning of its own
    Plain {
        #[serde(default)]
        original: String,
    },
    /// Marker opening a step-label block
    StepLabel {
        #[serde(default)]
        label: String,
    },
    /// Call to another method of the model
    SubMethodInvoke { method_key: String },
    /// `variable = value`
    VarAssign { variable: Variable, value: Box<Code> },
    /// Test-step marker; must be resolved before the model reaches this layer
    TestStep,
}

impl Code {
    pub fn is_step_label(&self) -> bool {
        matches!(self, Code::StepLabel { .. })
    }

    fn visit_invoked_keys<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Code::SubMethodInvoke { method_key } => out.push(method_key),
            Code::VarAssign { value, .. } => value.visit_invoked_keys(out),
            Code::Plain { .. } | Code::StepLabel { .. } | Code::TestStep => {}
        }
    }
}

/// One statement of a method body, covering source lines `[start_line, end_line]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLine {
    pub start_line: u32,
    pub end_line: u32,
    pub code: Code,
}

impl CodeLine {
    pub fn new(start_line: u32, end_line: u32, code: Code) -> Self {
        Self {
            start_line,
            end_line,
            code,
        }
    }

    /// Single-line statement
    pub fn at(line: u32, code: Code) -> Self {
        Self::new(line, line, code)
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

/// Build the identity key of a method
///
/// `args` is the comma-separated argument type list as reported by the
/// instrumentation layer, so overloads get distinct keys.
pub fn method_key(class_key: &str, simple_name: &str, args: &str) -> String {
    format!("{}.{}({})", class_key, simple_name, args)
}

/// A method of the logical source model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalMethod {
    key: String,
    class_key: String,
    simple_name: String,
    capture_style: CaptureStyle,
    code_body: Vec<CodeLine>,
}

impl LogicalMethod {
    pub fn new(
        class_key: impl Into<String>,
        simple_name: impl Into<String>,
        args: &str,
        capture_style: CaptureStyle,
        code_body: Vec<CodeLine>,
    ) -> Self {
        let class_key = class_key.into();
        let simple_name = simple_name.into();
        Self {
            key: method_key(&class_key, &simple_name, args),
            class_key,
            simple_name,
            capture_style,
            code_body,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Qualified name of the owning class
    pub fn class_key(&self) -> &str {
        &self.class_key
    }

    pub fn simple_name(&self) -> &str {
        &self.simple_name
    }

    pub fn capture_style(&self) -> CaptureStyle {
        self.capture_style
    }

    pub fn code_body(&self) -> &[CodeLine] {
        &self.code_body
    }

    pub fn code_line(&self, index: usize) -> Option<&CodeLine> {
        self.code_body.get(index)
    }

    /// Index of the first statement whose line range contains `line`
    pub fn statement_index_for_line(&self, line: u32) -> Option<usize> {
        self.code_body.iter().position(|c| c.contains(line))
    }

    pub fn is_step_label_at(&self, index: usize) -> bool {
        self.code_line(index).is_some_and(|c| c.code.is_step_label())
    }
}

/// Read-only lookups the correlator performs against the source model
pub trait SourceModelIndex {
    /// Root (test entry) methods declared with this class and simple name
    fn lookup_root_methods_by_name(
        &self,
        class_key: &str,
        simple_name: &str,
    ) -> Vec<Arc<LogicalMethod>>;

    /// Method with exactly this key, see [`method_key`]
    fn lookup_method_by_key(&self, key: &str) -> Option<Arc<LogicalMethod>>;

    /// Every overload with this class and simple name, in model order
    fn lookup_methods_by_name(
        &self,
        class_key: &str,
        simple_name: &str,
    ) -> Vec<Arc<LogicalMethod>>;
}

/// In-memory source model
#[derive(Debug, Default, Clone)]
pub struct SourceModel {
    by_key: HashMap<String, Arc<LogicalMethod>>,
    by_name: HashMap<(String, String), Vec<Arc<LogicalMethod>>>,
    root_keys: HashSet<String>,
}

impl SourceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method; a method with the same key is replaced
    pub fn add_method(&mut self, method: LogicalMethod) -> Arc<LogicalMethod> {
        let method = Arc::new(method);
        let name = (
            method.class_key().to_string(),
            method.simple_name().to_string(),
        );
        let overloads = self.by_name.entry(name).or_default();
        overloads.retain(|m| m.key() != method.key());
        overloads.push(Arc::clone(&method));
        self.by_key.insert(method.key().to_string(), Arc::clone(&method));
        method
    }

    /// Register a method and mark it as a root method
    pub fn add_root_method(&mut self, method: LogicalMethod) -> Arc<LogicalMethod> {
        let method = self.add_method(method);
        self.root_keys.insert(method.key().to_string());
        method
    }

    pub fn method_count(&self) -> usize {
        self.by_key.len()
    }

    pub fn root_method_count(&self) -> usize {
        self.root_keys.len()
    }

    /// Load and validate a source model from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            bail!("Source model file not found: {}", path_ref.display());
        }

        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read source model file: {}", path_ref.display()))?;

        Self::from_json_str(&contents)
    }

    /// Parse and validate a source model from JSON text
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let file: SourceModelFile =
            serde_json::from_str(contents).context("Invalid source model JSON")?;

        if file.version != SUPPORTED_VERSION {
            bail!(
                "Unsupported source model version: {} (expected {})",
                file.version,
                SUPPORTED_VERSION
            );
        }

        let mut model = SourceModel::new();
        for entry in file.methods {
            if entry.class_key.is_empty() || entry.simple_name.is_empty() {
                bail!("Invalid source model: method without class_key or simple_name");
            }
            let root = entry.root;
            let method = LogicalMethod::new(
                entry.class_key,
                entry.simple_name,
                &entry.arg_classes,
                entry.capture_style,
                entry.code_body,
            );
            if model.by_key.contains_key(method.key()) {
                bail!("Invalid source model: duplicated method key {}", method.key());
            }
            if root {
                model.add_root_method(method);
            } else {
                model.add_method(method);
            }
        }

        model.validate_invocations()?;
        Ok(model)
    }

    fn validate_invocations(&self) -> Result<()> {
        for method in self.by_key.values() {
            let mut keys = Vec::new();
            for line in method.code_body() {
                line.code.visit_invoked_keys(&mut keys);
            }
            if let Some(missing) = keys.iter().find(|k| !self.by_key.contains_key(**k)) {
                bail!(
                    "Invalid source model: {} invokes unknown method {}",
                    method.key(),
                    missing
                );
            }
        }
        Ok(())
    }
}

impl SourceModelIndex for SourceModel {
    fn lookup_root_methods_by_name(
        &self,
        class_key: &str,
        simple_name: &str,
    ) -> Vec<Arc<LogicalMethod>> {
        self.lookup_methods_by_name(class_key, simple_name)
            .into_iter()
            .filter(|m| self.root_keys.contains(m.key()))
            .collect()
    }

    fn lookup_method_by_key(&self, key: &str) -> Option<Arc<LogicalMethod>> {
        self.by_key.get(key).cloned()
    }

    fn lookup_methods_by_name(
        &self,
        class_key: &str,
        simple_name: &str,
    ) -> Vec<Arc<LogicalMethod>> {
        self.by_name
            .get(&(class_key.to_string(), simple_name.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct SourceModelFile {
    version: u32,
    methods: Vec<MethodEntry>,
}

#[derive(Debug, Deserialize)]
struct MethodEntry {
    class_key: String,
    simple_name: String,
    #[serde(default)]
    arg_classes: String,
    #[serde(default)]
    capture_style: CaptureStyle,
    #[serde(default)]
    root: bool,
    #[serde(default)]
    code_body: Vec<CodeLine>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_model(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const MODEL_JSON: &str = r#"{
        "version": 1,
        "methods": [
            {
                "class_key": "pkg.LoginTest",
                "simple_name": "run",
                "root": true,
                "code_body": [
                    { "start_line": 10, "end_line": 10, "code": { "kind": "step_label", "label": "open" } },
                    { "start_line": 11, "end_line": 12, "code": { "kind": "sub_method_invoke", "method_key": "pkg.Page.open(String)" } },
                    { "start_line": 13, "end_line": 13, "code": {
                        "kind": "var_assign",
                        "variable": { "kind": "field", "name": "title" },
                        "value": { "kind": "plain" }
                    } }
                ]
            },
            {
                "class_key": "pkg.Page",
                "simple_name": "open",
                "arg_classes": "String",
                "capture_style": "STEP_IN"
            }
        ]
    }"#;

    #[test]
    fn test_parse_valid_model() {
        let temp_file = create_temp_model(MODEL_JSON);
        let model = SourceModel::from_file(temp_file.path()).unwrap();

        assert_eq!(model.method_count(), 2);
        assert_eq!(model.root_method_count(), 1);

        let open = model.lookup_method_by_key("pkg.Page.open(String)").unwrap();
        assert_eq!(open.capture_style(), CaptureStyle::StepIn);
        assert!(open.code_body().is_empty());
    }

    #[test]
    fn test_root_lookup_ignores_non_root_methods() {
        let model = SourceModel::from_json_str(MODEL_JSON).unwrap();

        let roots = model.lookup_root_methods_by_name("pkg.LoginTest", "run");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].key(), "pkg.LoginTest.run()");

        assert!(model.lookup_root_methods_by_name("pkg.Page", "open").is_empty());
        assert_eq!(model.lookup_methods_by_name("pkg.Page", "open").len(), 1);
    }

    #[test]
    fn test_default_capture_style_is_this_line() {
        let model = SourceModel::from_json_str(MODEL_JSON).unwrap();
        let run = model.lookup_method_by_key("pkg.LoginTest.run()").unwrap();
        assert_eq!(run.capture_style(), CaptureStyle::ThisLine);
    }

    #[test]
    fn test_statement_index_for_line() {
        let model = SourceModel::from_json_str(MODEL_JSON).unwrap();
        let run = model.lookup_method_by_key("pkg.LoginTest.run()").unwrap();

        assert_eq!(run.statement_index_for_line(10), Some(0));
        assert_eq!(run.statement_index_for_line(12), Some(1));
        assert_eq!(run.statement_index_for_line(13), Some(2));
        assert_eq!(run.statement_index_for_line(99), None);
        assert!(run.is_step_label_at(0));
        assert!(!run.is_step_label_at(1));
        assert!(!run.is_step_label_at(7));
    }

    #[test]
    fn test_unknown_invocation_target_rejected() {
        let json = r#"{
            "version": 1,
            "methods": [
                {
                    "class_key": "pkg.T",
                    "simple_name": "run",
                    "code_body": [
                        { "start_line": 1, "end_line": 1, "code": { "kind": "sub_method_invoke", "method_key": "pkg.T.missing()" } }
                    ]
                }
            ]
        }"#;
        let err = SourceModel::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("invokes unknown method pkg.T.missing()"));
    }

    #[test]
    fn test_unsupported_version() {
        let err = SourceModel::from_json_str(r#"{ "version": 7, "methods": [] }"#).unwrap_err();
        assert!(err.to_string().contains("Unsupported source model version"));
    }

    #[test]
    fn test_invalid_json() {
        let err = SourceModel::from_json_str("{ not json }").unwrap_err();
        assert!(err.to_string().contains("Invalid source model JSON"));
    }

    #[test]
    fn test_missing_file() {
        let err = SourceModel::from_file("/nonexistent/model.json").unwrap_err();
        assert!(err.to_string().contains("Source model file not found"));
    }

    #[test]
    fn test_add_method_replaces_same_key() {
        let mut model = SourceModel::new();
        model.add_method(LogicalMethod::new("A", "f", "", CaptureStyle::None, vec![]));
        model.add_method(LogicalMethod::new("A", "f", "", CaptureStyle::StepIn, vec![]));
        model.add_method(LogicalMethod::new("A", "f", "int", CaptureStyle::None, vec![]));

        assert_eq!(model.method_count(), 2);
        let overloads = model.lookup_methods_by_name("A", "f");
        assert_eq!(overloads.len(), 2);
        assert_eq!(
            model.lookup_method_by_key("A.f()").unwrap().capture_style(),
            CaptureStyle::StepIn
        );
    }

    #[test]
    fn test_capture_style_predicates() {
        assert!(CaptureStyle::ThisLine.captures_invoking_line());
        assert!(CaptureStyle::StepIn.captures_invoking_line());
        assert!(!CaptureStyle::StepInOnly.captures_invoking_line());
        assert!(!CaptureStyle::None.captures_invoking_line());

        assert!(CaptureStyle::StepIn.allows_step_in());
        assert!(CaptureStyle::StepInOnly.allows_step_in());
        assert!(!CaptureStyle::ThisLine.allows_step_in());
        assert!(!CaptureStyle::None.allows_step_in());
    }
}
