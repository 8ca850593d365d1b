//! Profiler transports.
//!
//! A transport carries one profiler command at a time and returns its reply.
//! Requests take `&mut self`, so a transport has exactly one writer and no
//! two requests are ever in flight together.
//!
//! ```text
//! ┌──────────────────┐   post(command)   ┌──────────────────────────┐
//! │ CoverageSession  │──────────────────►│ ProfilerTransport        │
//! │                  │◄──────────────────│  InspectorTransport (ws) │
//! └──────────────────┘    reply (JSON)   │  ChromiumTransport (CDP) │
//!                                        │  MockTransport (tests)   │
//!                                        └──────────────────────────┘
//! ```

#[cfg(feature = "browser")]
mod chromium;
#[cfg(feature = "inspector")]
mod inspector;
mod mock;

#[cfg(feature = "browser")]
pub use chromium::ChromiumTransport;
#[cfg(feature = "inspector")]
pub use inspector::InspectorTransport;
pub use mock::{MockProfiler, MockTransport};

use crate::config::PreciseCoverageConfig;
use crate::result::CoverageResult;
use async_trait::async_trait;
use serde_json::Value;

/// A command in the CDP `Profiler` domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilerCommand {
    /// `Profiler.enable`
    Enable,
    /// `Profiler.startPreciseCoverage`
    StartPreciseCoverage(PreciseCoverageConfig),
    /// `Profiler.takePreciseCoverage`
    TakePreciseCoverage,
    /// `Profiler.stopPreciseCoverage`
    StopPreciseCoverage,
    /// `Profiler.disable`
    Disable,
}

impl ProfilerCommand {
    /// Protocol method name
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Enable => "Profiler.enable",
            Self::StartPreciseCoverage(_) => "Profiler.startPreciseCoverage",
            Self::TakePreciseCoverage => "Profiler.takePreciseCoverage",
            Self::StopPreciseCoverage => "Profiler.stopPreciseCoverage",
            Self::Disable => "Profiler.disable",
        }
    }

    /// Protocol parameters, if the command takes any
    #[must_use]
    pub fn params(&self) -> Option<Value> {
        match self {
            Self::StartPreciseCoverage(config) => Some(config.to_params()),
            _ => None,
        }
    }
}

/// Single-writer request/response channel to an execution profiler
#[async_trait]
pub trait ProfilerTransport: Send {
    /// Open the channel
    async fn open(&mut self) -> CoverageResult<()>;

    /// Send one command and wait for its reply
    async fn post(&mut self, command: ProfilerCommand) -> CoverageResult<Value>;

    /// Close the channel
    async fn close(&mut self) -> CoverageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(ProfilerCommand::Enable.method(), "Profiler.enable");
        assert_eq!(
            ProfilerCommand::TakePreciseCoverage.method(),
            "Profiler.takePreciseCoverage"
        );
        assert_eq!(ProfilerCommand::Disable.method(), "Profiler.disable");
    }

    #[test]
    fn test_only_start_carries_params() {
        let start = ProfilerCommand::StartPreciseCoverage(PreciseCoverageConfig::default());
        let params = start.params().unwrap_or_default();
        assert_eq!(params["callCount"], true);
        assert_eq!(params["detailed"], false);

        assert!(ProfilerCommand::Enable.params().is_none());
        assert!(ProfilerCommand::TakePreciseCoverage.params().is_none());
        assert!(ProfilerCommand::StopPreciseCoverage.params().is_none());
    }
}
