//! CDP Profiler script coverage model.
//!
//! Mirrors the reply of `Profiler.takePreciseCoverage`: one record per
//! script, each with per-function ranges and call counts. The collector only
//! looks at [`ScriptCoverage::url`]; the rest is kept so snapshots decode
//! losslessly and can be inspected in logs.

use crate::result::CoverageResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A range of a script that was covered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRange {
    /// Start offset (character position)
    pub start_offset: u32,
    /// End offset (character position)
    pub end_offset: u32,
    /// Number of times this range was executed
    pub count: u32,
}

/// Coverage data for a single function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCoverage {
    /// Function name (empty for anonymous functions)
    #[serde(default)]
    pub function_name: String,
    /// Ranges within this function
    #[serde(default)]
    pub ranges: Vec<CoverageRange>,
    /// Whether ranges are block-granular
    #[serde(default)]
    pub is_block_coverage: bool,
}

impl FunctionCoverage {
    /// Check if the function was executed at least once
    #[must_use]
    pub fn was_executed(&self) -> bool {
        self.ranges.iter().any(|r| r.count > 0)
    }
}

/// Coverage data for a single script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCoverage {
    /// Script ID from CDP
    pub script_id: String,
    /// Script location (usually a URL)
    #[serde(default)]
    pub url: String,
    /// Functions in this script
    #[serde(default)]
    pub functions: Vec<FunctionCoverage>,
}

impl ScriptCoverage {
    /// Count functions that were executed
    #[must_use]
    pub fn functions_executed(&self) -> usize {
        self.functions.iter().filter(|f| f.was_executed()).count()
    }
}

/// Cumulative coverage returned by one `Profiler.takePreciseCoverage` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    /// Coverage data per script
    #[serde(rename = "result", default)]
    pub scripts: Vec<ScriptCoverage>,
    /// Profiler monotonic timestamp (seconds)
    #[serde(default)]
    pub timestamp: f64,
}

impl CoverageSnapshot {
    /// Create an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a raw `takePreciseCoverage` reply
    ///
    /// # Errors
    ///
    /// Returns error if the reply does not match the profiler's coverage shape
    pub fn from_value(value: Value) -> CoverageResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Add script coverage
    pub fn add_script(&mut self, script: ScriptCoverage) {
        self.scripts.push(script);
    }

    /// Script locations in snapshot order
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().map(|s| s.url.as_str())
    }

    /// Number of script records
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Whether the snapshot holds no scripts
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Total executed functions across all scripts
    #[must_use]
    pub fn functions_executed(&self) -> usize {
        self.scripts.iter().map(|s| s.functions_executed()).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn function(name: &str, count: u32) -> FunctionCoverage {
        FunctionCoverage {
            function_name: name.to_string(),
            ranges: vec![CoverageRange {
                start_offset: 0,
                end_offset: 50,
                count,
            }],
            is_block_coverage: false,
        }
    }

    #[test]
    fn test_function_coverage_executed() {
        assert!(function("add", 3).was_executed());
        assert!(!function("unused", 0).was_executed());
    }

    #[test]
    fn test_script_functions_executed() {
        let script = ScriptCoverage {
            script_id: "1".to_string(),
            url: "file:///project/math.ts".to_string(),
            functions: vec![function("add", 1), function("divide", 0)],
        };
        assert_eq!(script.functions_executed(), 1);
    }

    #[test]
    fn test_decode_take_precise_coverage_reply() {
        let reply = json!({
            "result": [
                {
                    "scriptId": "42",
                    "url": "file:///project/math.ts",
                    "functions": [
                        {
                            "functionName": "add",
                            "ranges": [{ "startOffset": 0, "endOffset": 30, "count": 2 }],
                            "isBlockCoverage": false
                        }
                    ]
                },
                { "scriptId": "43", "url": "node:internal/timers", "functions": [] }
            ],
            "timestamp": 1234.5
        });

        let snapshot = CoverageSnapshot::from_value(reply).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.scripts[0].script_id, "42");
        assert_eq!(snapshot.scripts[0].functions[0].ranges[0].count, 2);
        assert!((snapshot.timestamp - 1234.5).abs() < f64::EPSILON);
        assert_eq!(
            snapshot.urls().collect::<Vec<_>>(),
            vec!["file:///project/math.ts", "node:internal/timers"]
        );
        assert_eq!(snapshot.functions_executed(), 1);
    }

    #[test]
    fn test_decode_tolerates_missing_url_and_functions() {
        let snapshot = CoverageSnapshot::from_value(json!({
            "result": [{ "scriptId": "7" }]
        }))
        .unwrap();
        assert_eq!(snapshot.scripts[0].url, "");
        assert!(snapshot.scripts[0].functions.is_empty());
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let err = CoverageSnapshot::from_value(json!({ "result": "nope" }));
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = CoverageSnapshot::new();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.urls().count(), 0);
    }
}
