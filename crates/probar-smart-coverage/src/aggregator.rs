//! Coverage aggregator.
//!
//! Folds per-test captures into a [`CoverageMap`] keyed by covered file, and
//! writes the map once when the run ends:
//!
//! ```json
//! { "src/math.ts": { "math.test.ts::adds|run": [1] } }
//! ```

use crate::config::SmartCoverageConfig;
use crate::hooks::{ReporterHooks, TestFile, TestTask};
use crate::result::{CoverageError, CoverageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Marker stored for each (file, test) fact
pub const COVERED_MARKER: u32 = 1;

/// `file -> test key -> [1]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap(BTreeMap<String, BTreeMap<String, Vec<u32>>>);

impl CoverageMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `test_key` covered every file in `covered_files`
    ///
    /// Recording the same fact again leaves the map unchanged.
    pub fn record<S: AsRef<str>>(&mut self, test_key: &str, covered_files: &[S]) {
        for file in covered_files {
            self.record_file(file.as_ref(), test_key);
        }
    }

    /// Record a single (file, test) fact
    pub fn record_file(&mut self, file: &str, test_key: &str) {
        self.0
            .entry(file.to_string())
            .or_default()
            .entry(test_key.to_string())
            .or_insert_with(|| vec![COVERED_MARKER]);
    }

    /// Whether no fact has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of covered files
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.0.len()
    }

    /// Test keys recorded against `file`, in sorted order
    #[must_use]
    pub fn tests_for(&self, file: &str) -> Vec<&str> {
        self.0
            .get(file)
            .map(|tests| tests.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether `test_key` was recorded against `file`
    #[must_use]
    pub fn contains(&self, file: &str, test_key: &str) -> bool {
        self.0
            .get(file)
            .is_some_and(|tests| tests.contains_key(test_key))
    }

    /// Covered files, in sorted order
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> CoverageResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a map previously written by [`Self::write_to`]
    ///
    /// # Errors
    ///
    /// Returns error if `json` is not a valid coverage map
    pub fn from_json(json: &str) -> CoverageResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the map to `path`, creating parent directories as needed
    ///
    /// Overwrites any existing file.
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be created or the file cannot be
    /// written
    pub fn write_to(&self, path: &Path) -> CoverageResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| CoverageError::output_write(parent, e))?;
            }
        }
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| CoverageError::output_write(path, e))
    }
}

/// Reporter that owns one run's coverage map
#[derive(Debug)]
pub struct CoverageReporter {
    output_file: Option<PathBuf>,
    map: CoverageMap,
    finalized: bool,
}

impl CoverageReporter {
    /// Create a reporter; inert when `config` is disabled
    #[must_use]
    pub fn new(config: &SmartCoverageConfig) -> Self {
        Self {
            output_file: config.output_file().map(Path::to_path_buf),
            map: CoverageMap::new(),
            finalized: false,
        }
    }

    /// Whether the reporter will write an artifact
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.output_file.is_some()
    }

    /// Destination of the artifact
    #[must_use]
    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    /// Record one test's capture
    pub fn record<S: AsRef<str>>(&mut self, test_key: &str, covered_files: &[S]) {
        self.map.record(test_key, covered_files);
    }

    /// Map accumulated so far
    #[must_use]
    pub const fn map(&self) -> &CoverageMap {
        &self.map
    }

    /// Write the artifact, returning where it went
    ///
    /// Returns `Ok(None)` without touching the filesystem when disabled.
    ///
    /// # Errors
    ///
    /// Returns error if called twice in one run, or if the artifact cannot
    /// be written
    pub fn finalize(&mut self) -> CoverageResult<Option<PathBuf>> {
        let Some(path) = self.output_file.clone() else {
            return Ok(None);
        };
        if self.finalized {
            return Err(CoverageError::invalid_state(format!(
                "coverage already written to {}",
                path.display()
            )));
        }
        if self.map.is_empty() {
            warn!("no coverage data collected");
        }
        self.map.write_to(&path)?;
        self.finalized = true;
        info!(path = %path.display(), files = self.map.file_count(), "wrote {}", path.display());
        Ok(Some(path))
    }
}

impl ReporterHooks for CoverageReporter {
    fn on_test_run_start(&mut self, files: &[TestFile]) -> CoverageResult<()> {
        if self.is_enabled() {
            info!(files = files.len(), "generating CircleCI coverage JSON...");
        }
        Ok(())
    }

    fn on_test_case_result(&mut self, task: &TestTask) -> CoverageResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let (Some(test_key), Some(covered_files)) = (task.meta.test_key(), task.meta.covered_files())
        else {
            debug!(test = %task.name, "no coverage metadata; skipped");
            return Ok(());
        };
        self.map.record(test_key, &covered_files);
        Ok(())
    }

    fn on_test_run_end(&mut self) -> CoverageResult<()> {
        self.finalize().map(|_| ())
    }
}
