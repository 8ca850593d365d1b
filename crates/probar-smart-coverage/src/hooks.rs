//! Host test-framework boundary.
//!
//! A host framework drives two kinds of hooks:
//!
//! - [`RunnerHooks`] wrap test execution: before/after the whole set of test
//!   files, and before/after each test body.
//! - [`ReporterHooks`] observe results: run start, each finished test, and
//!   run end.
//!
//! Each test carries a [`TaskMeta`] side channel. The coverage runner writes
//! `testKey` and `coveredFiles` into it; the reporter reads them back.

use crate::result::CoverageResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metadata key holding the test key
pub const TEST_KEY_META: &str = "testKey";

/// Metadata key holding the covered file list
pub const COVERED_FILES_META: &str = "coveredFiles";

/// Free-form key/value metadata attached to one test's result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskMeta(BTreeMap<String, Value>);

impl TaskMeta {
    /// Create empty metadata
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether nothing has been attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Attach a coverage capture
    pub fn set_coverage(&mut self, test_key: impl Into<String>, covered_files: &[String]) {
        self.insert(TEST_KEY_META, Value::String(test_key.into()));
        self.insert(
            COVERED_FILES_META,
            Value::Array(covered_files.iter().cloned().map(Value::String).collect()),
        );
    }

    /// Attached test key, if any
    #[must_use]
    pub fn test_key(&self) -> Option<&str> {
        self.get(TEST_KEY_META).and_then(Value::as_str)
    }

    /// Attached covered files, if present and well-formed
    #[must_use]
    pub fn covered_files(&self) -> Option<Vec<String>> {
        self.get(COVERED_FILES_META)?
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

/// A test file handed to the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFile {
    /// Absolute path of the test file
    pub path: PathBuf,
}

impl TestFile {
    /// Create a test file entry
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// One test as seen by the hooks
#[derive(Debug, Clone, PartialEq)]
pub struct TestTask {
    /// File that declares the test
    pub file: PathBuf,
    /// Fully-qualified display name
    pub name: String,
    /// Result metadata
    pub meta: TaskMeta,
}

impl TestTask {
    /// Create a task with empty metadata
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
            meta: TaskMeta::new(),
        }
    }

    /// File that declares the test
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }
}

/// Runner lifecycle hooks
///
/// Default methods are the host's own behaviour. Wrappers call the inner
/// runner first, then add their own work.
#[async_trait]
pub trait RunnerHooks: Send {
    /// Before any test file runs
    async fn on_before_run_files(&mut self, _files: &[TestFile]) -> CoverageResult<()> {
        Ok(())
    }

    /// Immediately before a test body
    async fn on_before_try_task(&mut self, _task: &mut TestTask) -> CoverageResult<()> {
        Ok(())
    }

    /// Immediately after a test body, on every exit path
    async fn on_after_try_task(&mut self, _task: &mut TestTask) -> CoverageResult<()> {
        Ok(())
    }

    /// After all test files have run
    async fn on_after_run_files(&mut self, _files: &[TestFile]) -> CoverageResult<()> {
        Ok(())
    }
}

/// Host runner with no behaviour of its own
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRunner;

impl RunnerHooks for DefaultRunner {}

/// Reporter lifecycle hooks
pub trait ReporterHooks {
    /// Before the run starts
    fn on_test_run_start(&mut self, _files: &[TestFile]) -> CoverageResult<()> {
        Ok(())
    }

    /// After each test finishes, with its metadata
    fn on_test_case_result(&mut self, _task: &TestTask) -> CoverageResult<()> {
        Ok(())
    }

    /// After the run ends
    fn on_test_run_end(&mut self) -> CoverageResult<()> {
        Ok(())
    }
}
