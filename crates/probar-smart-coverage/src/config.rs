//! Activation and profiler configuration.
//!
//! Coverage collection is switched on by a single environment variable whose
//! value is the output path. The variable is read once, into a
//! [`SmartCoverageConfig`], which is then handed to both the collector and the
//! reporter. Nothing downstream reads process state again.

use crate::result::CoverageResult;
use serde_json::{json, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable that activates coverage collection
pub const ENV_VAR: &str = "CIRCLECI_COVERAGE";

/// Dependency directories excluded from coverage by default
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &["node_modules"];

/// Parameters for `Profiler.startPreciseCoverage`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreciseCoverageConfig {
    /// Collect call counts rather than binary coverage
    pub call_count: bool,
    /// Collect block-level ranges instead of function-level only
    pub detailed: bool,
    /// Allow the profiler to push coverage updates on its own
    pub allow_triggered_updates: bool,
}

impl Default for PreciseCoverageConfig {
    fn default() -> Self {
        Self {
            call_count: true,
            detailed: false,
            allow_triggered_updates: false,
        }
    }
}

impl PreciseCoverageConfig {
    /// Create a config with call counts on and detail off
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable call count tracking
    #[must_use]
    pub const fn with_call_count(mut self, enabled: bool) -> Self {
        self.call_count = enabled;
        self
    }

    /// Enable detailed range information
    #[must_use]
    pub const fn with_detailed(mut self, enabled: bool) -> Self {
        self.detailed = enabled;
        self
    }

    /// Render as CDP command parameters
    #[must_use]
    pub fn to_params(&self) -> Value {
        json!({
            "callCount": self.call_count,
            "detailed": self.detailed,
            "allowTriggeredUpdates": self.allow_triggered_updates,
        })
    }
}

/// Configuration shared by the coverage runner and reporter
#[derive(Debug, Clone)]
pub struct SmartCoverageConfig {
    output_file: Option<PathBuf>,
    working_dir: PathBuf,
    excluded_dirs: Vec<String>,
    precise: PreciseCoverageConfig,
}

impl SmartCoverageConfig {
    /// Resolve from the process environment and current directory
    ///
    /// # Errors
    ///
    /// Returns error if the current directory cannot be determined
    pub fn from_env() -> CoverageResult<Self> {
        let working_dir = std::env::current_dir()?;
        Ok(Self::from_lookup(working_dir, |key| std::env::var_os(key)))
    }

    /// Resolve using an arbitrary variable lookup
    pub fn from_lookup<F>(working_dir: impl Into<PathBuf>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let output_file = lookup(ENV_VAR).map(PathBuf::from);
        Self {
            output_file,
            ..Self::disabled(working_dir)
        }
    }

    /// Config with collection switched on, writing to `output_file`
    pub fn enabled(output_file: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_file: Some(output_file.into()),
            ..Self::disabled(working_dir)
        }
    }

    /// Config with collection switched off
    pub fn disabled(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_file: None,
            working_dir: working_dir.into(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS
                .iter()
                .map(|dir| (*dir).to_string())
                .collect(),
            precise: PreciseCoverageConfig::default(),
        }
    }

    /// Add another reserved dependency directory name
    #[must_use]
    pub fn with_excluded_dir(mut self, dir: impl Into<String>) -> Self {
        let dir = dir.into();
        if !self.excluded_dirs.contains(&dir) {
            self.excluded_dirs.push(dir);
        }
        self
    }

    /// Override the precise coverage parameters
    #[must_use]
    pub fn with_precise(mut self, precise: PreciseCoverageConfig) -> Self {
        self.precise = precise;
        self
    }

    /// Whether coverage collection is active
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.output_file.is_some()
    }

    /// Destination of the coverage map
    #[must_use]
    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    /// Directory that test keys and covered files are made relative to
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Reserved dependency directory names
    #[must_use]
    pub fn excluded_dirs(&self) -> &[String] {
        &self.excluded_dirs
    }

    /// Precise coverage parameters
    #[must_use]
    pub const fn precise(&self) -> &PreciseCoverageConfig {
        &self.precise
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod precise_config_tests {
        use super::*;

        #[test]
        fn test_default_is_call_count_without_detail() {
            let config = PreciseCoverageConfig::default();
            assert!(config.call_count);
            assert!(!config.detailed);
            assert!(!config.allow_triggered_updates);
        }

        #[test]
        fn test_builder() {
            let config = PreciseCoverageConfig::new()
                .with_call_count(false)
                .with_detailed(true);
            assert!(!config.call_count);
            assert!(config.detailed);
        }

        #[test]
        fn test_params_use_cdp_names() {
            let params = PreciseCoverageConfig::default().to_params();
            assert_eq!(params["callCount"], true);
            assert_eq!(params["detailed"], false);
            assert_eq!(params["allowTriggeredUpdates"], false);
        }
    }

    mod activation_tests {
        use super::*;

        #[test]
        fn test_unset_variable_disables() {
            let config = SmartCoverageConfig::from_lookup("/project", |_| None);
            assert!(!config.is_enabled());
            assert!(config.output_file().is_none());
        }

        #[test]
        fn test_set_variable_enables_with_path() {
            let config = SmartCoverageConfig::from_lookup("/project", |key| {
                (key == ENV_VAR).then(|| OsString::from("out/coverage.json"))
            });
            assert!(config.is_enabled());
            assert_eq!(
                config.output_file(),
                Some(Path::new("out/coverage.json"))
            );
            assert_eq!(config.working_dir(), Path::new("/project"));
        }

        #[test]
        fn test_other_variables_ignored() {
            let config = SmartCoverageConfig::from_lookup("/project", |key| {
                (key == "SOMETHING_ELSE").then(|| OsString::from("x"))
            });
            assert!(!config.is_enabled());
        }

        #[test]
        fn test_default_excluded_dirs() {
            let config = SmartCoverageConfig::disabled("/project");
            assert_eq!(config.excluded_dirs(), ["node_modules".to_string()]);
        }

        #[test]
        fn test_with_excluded_dir_deduplicates() {
            let config = SmartCoverageConfig::enabled("cov.json", "/project")
                .with_excluded_dir("vendor")
                .with_excluded_dir("node_modules")
                .with_excluded_dir("vendor");
            assert_eq!(config.excluded_dirs().len(), 2);
            assert!(config.excluded_dirs().contains(&"vendor".to_string()));
        }

        #[test]
        fn test_with_precise_override() {
            let config = SmartCoverageConfig::disabled("/project")
                .with_precise(PreciseCoverageConfig::new().with_detailed(true));
            assert!(config.precise().detailed);
        }
    }
}
