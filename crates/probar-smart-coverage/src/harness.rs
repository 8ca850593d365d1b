//! In-process test harness.
//!
//! Runs suites of plain Rust closures through a [`RunnerHooks`] /
//! [`ReporterHooks`] pair, the way a host framework would. A failing or
//! panicking body is recorded as a failure; the after-task hook still runs,
//! so every executed test gets its coverage capture.

use crate::hooks::{ReporterHooks, RunnerHooks, TaskMeta, TestFile, TestTask};
use crate::result::CoverageResult;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

type TestBody = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// A test suite: one test file and the tests it declares
#[derive(Debug, Clone)]
pub struct TestSuite {
    /// Absolute path of the test file
    pub file: PathBuf,
    /// Tests in declaration order
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    /// Create an empty suite for `file`
    #[must_use]
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            tests: Vec::new(),
        }
    }

    /// Add a test case
    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Add a test case, builder style
    #[must_use]
    pub fn with_test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    /// Get the number of tests
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }
}

/// A single test case
#[derive(Clone)]
pub struct TestCase {
    /// Test name
    pub name: String,
    body: TestBody,
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TestCase {
    /// Create a test case; `Err` from the body marks a failure
    #[must_use]
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    /// Run the body, turning a panic into a failure
    fn execute(&self) -> Result<(), String> {
        panic::catch_unwind(AssertUnwindSafe(|| (self.body)()))
            .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return format!("panicked: {message}");
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return format!("panicked: {message}");
    }
    "panicked".to_string()
}

/// Result of running a single test
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Test duration
    pub duration: Duration,
    /// Metadata attached by the runner hooks
    pub meta: TaskMeta,
}

impl TestResult {
    /// Create a passing test result
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
            duration: Duration::ZERO,
            meta: TaskMeta::new(),
        }
    }

    /// Create a failing test result
    #[must_use]
    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.into()),
            duration: Duration::ZERO,
            meta: TaskMeta::new(),
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set metadata
    #[must_use]
    pub fn with_meta(mut self, meta: TaskMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Results from running a test suite
#[derive(Debug, Clone)]
pub struct SuiteResults {
    /// Test file of the suite
    pub file: PathBuf,
    /// Individual test results
    pub results: Vec<TestResult>,
    /// Total duration
    pub duration: Duration,
}

impl SuiteResults {
    /// Check if all tests passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Get total test count
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }
}

/// Sequential harness driving runner and reporter hooks
#[derive(Debug, Default)]
pub struct TestHarness {
    /// Whether to stop on first failure
    pub fail_fast: bool,
}

impl TestHarness {
    /// Create a new test harness
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable fail-fast mode
    #[must_use]
    pub const fn with_fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    /// Run all suites, one test at a time
    ///
    /// Test failures are reported in the results, not as errors. Once the
    /// run has started, `on_after_run_files` is called even if a per-test
    /// hook fails, so the runner can release what it acquired.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a runner or reporter hook
    pub async fn run<R, P>(
        &self,
        suites: &[TestSuite],
        runner: &mut R,
        reporter: &mut P,
    ) -> CoverageResult<Vec<SuiteResults>>
    where
        R: RunnerHooks,
        P: ReporterHooks,
    {
        let files: Vec<TestFile> = suites.iter().map(|s| TestFile::new(&s.file)).collect();
        reporter.on_test_run_start(&files)?;
        runner.on_before_run_files(&files).await?;

        let outcome = self.run_suites(suites, runner, reporter).await;
        let finished = runner.on_after_run_files(&files).await;
        let results = outcome?;
        finished?;

        reporter.on_test_run_end()?;
        Ok(results)
    }

    async fn run_suites<R, P>(
        &self,
        suites: &[TestSuite],
        runner: &mut R,
        reporter: &mut P,
    ) -> CoverageResult<Vec<SuiteResults>>
    where
        R: RunnerHooks,
        P: ReporterHooks,
    {
        let mut all_results = Vec::with_capacity(suites.len());
        for suite in suites {
            let suite_start = Instant::now();
            let mut results = Vec::with_capacity(suite.test_count());
            let mut stop = false;

            for test in &suite.tests {
                let mut task = TestTask::new(&suite.file, &test.name);
                runner.on_before_try_task(&mut task).await?;
                let start = Instant::now();
                let outcome = test.execute();
                let duration = start.elapsed();
                runner.on_after_try_task(&mut task).await?;
                reporter.on_test_case_result(&task)?;

                let result = match outcome {
                    Ok(()) => TestResult::pass(&test.name),
                    Err(error) => TestResult::fail(&test.name, error),
                };
                debug!(test = %test.name, passed = result.passed, "test finished");
                stop = !result.passed && self.fail_fast;
                results.push(result.with_duration(duration).with_meta(task.meta));
                if stop {
                    break;
                }
            }

            all_results.push(SuiteResults {
                file: suite.file.clone(),
                results,
                duration: suite_start.elapsed(),
            });
            if stop {
                break;
            }
        }
        Ok(all_results)
    }
}
