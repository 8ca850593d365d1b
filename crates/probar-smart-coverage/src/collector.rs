//! Per-test coverage collector.
//!
//! [`CoverageRunner`] wraps a host runner and brackets every test body with a
//! coverage window:
//!
//! ```text
//!  Idle ──before_run_files──► Connected ──before_try_task──► Window
//!                                 ▲                            │
//!                                 └────────after_try_task──────┘
//!  Connected ──after_run_files──► Disconnected (reconnects on next run)
//! ```
//!
//! Opening a window takes a snapshot and throws it away, so the snapshot
//! taken when the window closes holds only what the test itself ran. That
//! capture is reduced to project-relative files and attached to the test's
//! metadata together with its test key.

use crate::cdp_coverage::CoverageSnapshot;
use crate::config::SmartCoverageConfig;
use crate::hooks::{RunnerHooks, TestFile, TestTask};
use crate::result::{CoverageError, CoverageResult};
use crate::session::CoverageSession;
use crate::transport::ProfilerTransport;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use url::Url;

/// Separates the test file from the test name in a test key
pub const TEST_KEY_SEPARATOR: &str = "::";

/// Suffix marking the execution phase of a test key
pub const RUN_PHASE_SUFFIX: &str = "|run";

/// Lexically normalized components: `.` dropped, `..` folded into its parent
fn normalized(path: &Path) -> Vec<Component<'_>> {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            _ => components.push(component),
        }
    }
    components
}

/// Path of `path` relative to `base`, using `..` to climb out of `base`
///
/// A relative `path` is taken as relative to `base`. Both sides are
/// normalized lexically first; neither has to exist. Equal paths give an
/// empty path.
#[must_use]
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    let joined = base.join(path);
    let base = normalized(base);
    let target = normalized(&joined);
    let shared = base
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in &base[shared..] {
        relative.push("..");
    }
    for component in &target[shared..] {
        relative.push(component.as_os_str());
    }
    relative
}

/// Canonical identifier for one test execution
///
/// `<test file relative to working_dir>::<test name>|run`
///
/// The format is fixed, so the separator is not escaped: a file path that
/// itself contains `::` can produce the same key as a different split of
/// file and name (`a::b` + `c` and `a` + `b::c` both give `a::b::c|run`).
/// Keys are unique as long as test file paths contain no `::`.
#[must_use]
pub fn test_key(working_dir: &Path, test_file: &Path, test_name: &str) -> String {
    let file = relative_path(working_dir, test_file);
    format!(
        "{}{TEST_KEY_SEPARATOR}{test_name}{RUN_PHASE_SUFFIX}",
        file.to_string_lossy()
    )
}

/// Local path of a `file:` location, `None` for anything else
fn local_file_path(location: &str) -> Option<PathBuf> {
    let url = Url::parse(location).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

fn has_excluded_component(path: &Path, excluded_dirs: &[String]) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => excluded_dirs.iter().any(|dir| name == OsStr::new(dir)),
        _ => false,
    })
}

/// Reduce a snapshot to the project files it touched
///
/// Keeps `file:` locations only, drops anything under a reserved dependency
/// directory, and returns sorted, deduplicated paths relative to
/// `working_dir`.
#[must_use]
pub fn covered_files(
    snapshot: &CoverageSnapshot,
    working_dir: &Path,
    excluded_dirs: &[String],
) -> Vec<String> {
    snapshot
        .urls()
        .filter_map(local_file_path)
        .filter(|path| !has_excluded_component(path, excluded_dirs))
        .map(|path| relative_path(working_dir, &path).to_string_lossy().into_owned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Collector lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectorState {
    /// Profiler not yet connected
    #[default]
    Idle,
    /// Connected, between tests
    Connected,
    /// A test body is running inside a coverage window
    Window,
    /// Disconnected after a run
    Disconnected,
}

impl CollectorState {
    /// Whether the profiler connection is live
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Window)
    }
}

/// Host runner wrapper that attaches per-test coverage to each test
#[derive(Debug)]
pub struct CoverageRunner<H, T> {
    inner: H,
    session: CoverageSession<T>,
    enabled: bool,
    working_dir: PathBuf,
    excluded_dirs: Vec<String>,
    state: CollectorState,
}

impl<H: RunnerHooks, T: ProfilerTransport> CoverageRunner<H, T> {
    /// Wrap `inner`, collecting through `transport` when `config` is enabled
    ///
    /// The transport is never opened while disabled.
    #[must_use]
    pub fn new(inner: H, transport: T, config: &SmartCoverageConfig) -> Self {
        Self {
            inner,
            session: CoverageSession::new(transport).with_config(config.precise().clone()),
            enabled: config.is_enabled(),
            working_dir: config.working_dir().to_path_buf(),
            excluded_dirs: config.excluded_dirs().to_vec(),
            state: CollectorState::Idle,
        }
    }

    /// Whether coverage collection is active
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> CollectorState {
        self.state
    }

    /// The wrapped host runner
    #[must_use]
    pub const fn inner(&self) -> &H {
        &self.inner
    }

    /// The coverage session
    #[must_use]
    pub const fn session(&self) -> &CoverageSession<T> {
        &self.session
    }

    /// Test key for a task under this runner's working directory
    #[must_use]
    pub fn test_key(&self, task: &TestTask) -> String {
        test_key(&self.working_dir, &task.file, &task.name)
    }

    /// Reduce a snapshot with this runner's working directory and exclusions
    #[must_use]
    pub fn reduce(&self, snapshot: &CoverageSnapshot) -> Vec<String> {
        covered_files(snapshot, &self.working_dir, &self.excluded_dirs)
    }
}

#[async_trait]
impl<H: RunnerHooks, T: ProfilerTransport> RunnerHooks for CoverageRunner<H, T> {
    async fn on_before_run_files(&mut self, files: &[TestFile]) -> CoverageResult<()> {
        self.inner.on_before_run_files(files).await?;
        if !self.enabled || self.state.is_connected() {
            return Ok(());
        }

        self.session.connect().await?;
        self.state = CollectorState::Connected;
        debug!(files = files.len(), "coverage collector connected");
        Ok(())
    }

    async fn on_before_try_task(&mut self, task: &mut TestTask) -> CoverageResult<()> {
        self.inner.on_before_try_task(task).await?;
        if !self.enabled {
            return Ok(());
        }
        if !self.state.is_connected() {
            return Err(CoverageError::invalid_state(format!(
                "coverage window opened for '{}' before the profiler was connected",
                task.name
            )));
        }

        let baseline = self.session.snapshot().await?;
        self.state = CollectorState::Window;
        debug!(test = %task.name, discarded = baseline.len(), "coverage window opened");
        Ok(())
    }

    async fn on_after_try_task(&mut self, task: &mut TestTask) -> CoverageResult<()> {
        self.inner.on_after_try_task(task).await?;
        if !self.enabled {
            return Ok(());
        }
        if self.state != CollectorState::Window {
            return Err(CoverageError::invalid_state(format!(
                "coverage captured for '{}' without an open window",
                task.name
            )));
        }

        let snapshot = self.session.snapshot().await?;
        self.state = CollectorState::Connected;

        let key = self.test_key(task);
        let files = self.reduce(&snapshot);
        debug!(
            test = %key,
            scripts = snapshot.len(),
            functions = snapshot.functions_executed(),
            files = files.len(),
            "coverage captured"
        );
        task.meta.set_coverage(key, &files);
        Ok(())
    }

    async fn on_after_run_files(&mut self, files: &[TestFile]) -> CoverageResult<()> {
        self.inner.on_after_run_files(files).await?;
        if !self.state.is_connected() {
            return Ok(());
        }

        let disconnected = self.session.disconnect().await;
        self.state = CollectorState::Disconnected;
        debug!("coverage collector disconnected");
        disconnected
    }
}
