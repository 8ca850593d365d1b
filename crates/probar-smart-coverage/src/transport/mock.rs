//! In-process profiler for testing without a live inspector.
//!
//! [`MockProfiler`] plays the part of the profiled runtime: test bodies call
//! [`MockProfiler::execute`] to mark a script as run, and the paired
//! [`MockTransport`] answers profiler commands from that state. Like V8's
//! call-count mode, taking coverage reports scripts run since the previous
//! take and then resets the counters.

use super::{ProfilerCommand, ProfilerTransport};
use crate::result::{CoverageError, CoverageResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    enabled: bool,
    collecting: bool,
    /// Every script ever seen; index is the script id
    scripts: Vec<String>,
    /// (script index, call count) since the last take
    pending: Vec<(usize, u32)>,
    takes: u32,
    history: Vec<String>,
    fail_on: Option<String>,
}

impl MockState {
    fn script_index(&mut self, url: &str) -> usize {
        if let Some(index) = self.scripts.iter().position(|s| s == url) {
            return index;
        }
        self.scripts.push(url.to_string());
        self.scripts.len() - 1
    }

    fn take(&mut self) -> Value {
        self.takes += 1;
        let result: Vec<Value> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(index, count)| {
                json!({
                    "scriptId": index.to_string(),
                    "url": self.scripts[index],
                    "functions": [{
                        "functionName": "",
                        "ranges": [{ "startOffset": 0, "endOffset": 1, "count": count }],
                        "isBlockCoverage": false
                    }]
                })
            })
            .collect();
        json!({ "result": result, "timestamp": f64::from(self.takes) })
    }
}

/// Handle to a scripted profiler shared between tests and a transport
#[derive(Debug, Clone, Default)]
pub struct MockProfiler {
    state: Arc<Mutex<MockState>>,
}

impl MockProfiler {
    /// Create a new mock profiler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport bound to this profiler
    #[must_use]
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            state: Arc::clone(&self.state),
        }
    }

    /// Record that the runtime executed the script at `url`
    ///
    /// Ignored unless precise coverage has been started.
    pub fn execute(&self, url: impl AsRef<str>) {
        let mut state = self.lock();
        if !state.collecting {
            return;
        }
        let index = state.script_index(url.as_ref());
        match state.pending.iter_mut().find(|(i, _)| *i == index) {
            Some((_, count)) => *count = count.saturating_add(1),
            None => state.pending.push((index, 1)),
        }
    }

    /// Make the next matching call fail; `"open"`, `"close"` or a method name
    pub fn fail_on(&self, call: impl Into<String>) {
        self.lock().fail_on = Some(call.into());
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Check if a call was made
    #[must_use]
    pub fn was_called(&self, call: &str) -> bool {
        self.lock().history.iter().any(|c| c == call)
    }

    /// Number of times a call was made
    #[must_use]
    pub fn call_count(&self, call: &str) -> usize {
        self.lock().history.iter().filter(|c| *c == call).count()
    }

    /// Whether the transport channel is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Whether precise coverage is currently being collected
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.lock().collecting
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Transport half of a [`MockProfiler`]
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(state: &mut MockState, call: &str) -> CoverageResult<()> {
        state.history.push(call.to_string());
        if state.fail_on.as_deref() == Some(call) {
            state.fail_on = None;
            return Err(CoverageError::protocol(call, "injected failure"));
        }
        Ok(())
    }

    fn handle(&self, command: &ProfilerCommand) -> CoverageResult<Value> {
        let mut state = self.lock();
        let method = command.method();
        if !state.open {
            return Err(CoverageError::channel_closed(method));
        }
        Self::record(&mut state, method)?;

        match command {
            ProfilerCommand::Enable => {
                state.enabled = true;
                Ok(json!({}))
            }
            ProfilerCommand::StartPreciseCoverage(_) => {
                if !state.enabled {
                    return Err(CoverageError::protocol(method, "Profiler is not enabled"));
                }
                state.collecting = true;
                Ok(json!({ "timestamp": 0.0 }))
            }
            ProfilerCommand::TakePreciseCoverage => {
                if !state.collecting {
                    return Err(CoverageError::protocol(
                        method,
                        "Precise coverage has not been started.",
                    ));
                }
                Ok(state.take())
            }
            ProfilerCommand::StopPreciseCoverage => {
                state.collecting = false;
                state.pending.clear();
                Ok(json!({}))
            }
            ProfilerCommand::Disable => {
                state.enabled = false;
                Ok(json!({}))
            }
        }
    }
}

#[async_trait]
impl ProfilerTransport for MockTransport {
    async fn open(&mut self) -> CoverageResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, "open")?;
        state.open = true;
        Ok(())
    }

    async fn post(&mut self, command: ProfilerCommand) -> CoverageResult<Value> {
        self.handle(&command)
    }

    async fn close(&mut self) -> CoverageResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, "close")?;
        state.open = false;
        state.enabled = false;
        state.collecting = false;
        Ok(())
    }
}
