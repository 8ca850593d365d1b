//! Probar Smart Coverage: per-test coverage attribution
//!
//! Records which source files each individual test executes, so a CI system
//! can later pick only the tests affected by a change.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  before/after  ┌─────────────────┐  CDP Profiler  ┌──────────┐
//! │ Host runner    │───────────────►│ CoverageRunner  │───────────────►│ Runtime  │
//! │ (RunnerHooks)  │   each test    │ (collector)     │◄───────────────│ (V8)     │
//! └────────────────┘                └────────┬────────┘   snapshots    └──────────┘
//!                                            │ testKey + coveredFiles
//!                                            ▼ (TaskMeta)
//!                                   ┌─────────────────┐   write once   ┌──────────┐
//!                                   │ CoverageReporter│───────────────►│ JSON     │
//!                                   │ (aggregator)    │                │ artifact │
//!                                   └─────────────────┘                └──────────┘
//! ```
//!
//! Collection is switched on by the `CIRCLECI_COVERAGE` environment variable,
//! which names the output file. When it is unset, no profiler channel is
//! opened and nothing is written.
//!
//! # Example
//!
//! ```ignore
//! let config = SmartCoverageConfig::from_env()?;
//! let mut runner = CoverageRunner::new(DefaultRunner, InspectorTransport::new(ws_url), &config);
//! let mut reporter = CoverageReporter::new(&config);
//! TestHarness::new().run(&suites, &mut runner, &mut reporter).await?;
//! ```

#![warn(missing_docs)]

/// Coverage aggregation and artifact output
pub mod aggregator;
/// CDP precise coverage types
pub mod cdp_coverage;
/// Per-test coverage collection
pub mod collector;
/// Activation and profiler settings
pub mod config;
/// In-process test harness
pub mod harness;
/// Host framework hooks and per-test metadata
pub mod hooks;
/// Tracing subscriber setup
pub mod logging;
mod result;
/// Profiler session lifecycle
pub mod session;
/// Profiler channels
pub mod transport;

pub use aggregator::{CoverageMap, CoverageReporter, COVERED_MARKER};
pub use cdp_coverage::{CoverageRange, CoverageSnapshot, FunctionCoverage, ScriptCoverage};
pub use collector::{
    covered_files, relative_path, test_key, CollectorState, CoverageRunner, RUN_PHASE_SUFFIX,
    TEST_KEY_SEPARATOR,
};
pub use config::{PreciseCoverageConfig, SmartCoverageConfig, DEFAULT_EXCLUDED_DIRS, ENV_VAR};
pub use harness::{SuiteResults, TestCase, TestHarness, TestResult, TestSuite};
pub use hooks::{
    DefaultRunner, ReporterHooks, RunnerHooks, TaskMeta, TestFile, TestTask, COVERED_FILES_META,
    TEST_KEY_META,
};
pub use logging::init_tracing;
pub use result::{CoverageError, CoverageResult};
pub use session::CoverageSession;
#[cfg(feature = "browser")]
pub use transport::ChromiumTransport;
#[cfg(feature = "inspector")]
pub use transport::InspectorTransport;
pub use transport::{MockProfiler, MockTransport, ProfilerCommand, ProfilerTransport};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        CoverageError, CoverageMap, CoverageReporter, CoverageResult, CoverageRunner,
        CoverageSession, DefaultRunner, ProfilerTransport, ReporterHooks, RunnerHooks,
        SmartCoverageConfig, TestCase, TestHarness, TestSuite,
    };
}
