//! Coverage session: lifecycle of one profiler connection.
//!
//! ## Usage
//!
//! ```ignore
//! let mut session = CoverageSession::new(InspectorTransport::new(endpoint));
//! session.connect().await?;
//! let baseline = session.snapshot().await?; // discard to open a window
//! run_test();
//! let coverage = session.snapshot().await?;
//! session.disconnect().await?;
//! ```

use crate::cdp_coverage::CoverageSnapshot;
use crate::config::PreciseCoverageConfig;
use crate::result::CoverageResult;
use crate::transport::{ProfilerCommand, ProfilerTransport};
use tracing::debug;

/// Owns a profiler transport and the precise-coverage settings sent to it
#[derive(Debug)]
pub struct CoverageSession<T> {
    transport: T,
    config: PreciseCoverageConfig,
    connected: bool,
}

impl<T: ProfilerTransport> CoverageSession<T> {
    /// Create a session with call-count, non-detailed coverage
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: PreciseCoverageConfig::default(),
            connected: false,
        }
    }

    /// Override the precise coverage parameters
    #[must_use]
    pub fn with_config(mut self, config: PreciseCoverageConfig) -> Self {
        self.config = config;
        self
    }

    /// Open the channel and start precise coverage
    ///
    /// Callers guard against connecting twice. If the profiler rejects a
    /// command the channel is closed again before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns error if the channel cannot be opened or the profiler rejects
    /// `Profiler.enable` / `Profiler.startPreciseCoverage`
    pub async fn connect(&mut self) -> CoverageResult<()> {
        self.transport.open().await?;
        if let Err(err) = self.start().await {
            if let Err(close_err) = self.transport.close().await {
                debug!(error = %close_err, "closing after failed connect");
            }
            return Err(err);
        }
        self.connected = true;
        debug!(
            call_count = self.config.call_count,
            detailed = self.config.detailed,
            "precise coverage started"
        );
        Ok(())
    }

    async fn start(&mut self) -> CoverageResult<()> {
        self.transport.post(ProfilerCommand::Enable).await?;
        self.transport
            .post(ProfilerCommand::StartPreciseCoverage(self.config.clone()))
            .await?;
        Ok(())
    }

    async fn stop(&mut self) -> CoverageResult<()> {
        self.transport
            .post(ProfilerCommand::StopPreciseCoverage)
            .await?;
        self.transport.post(ProfilerCommand::Disable).await?;
        Ok(())
    }

    /// Take the coverage accumulated since the previous take
    ///
    /// # Errors
    ///
    /// Returns error if the command fails or the reply cannot be decoded
    pub async fn snapshot(&mut self) -> CoverageResult<CoverageSnapshot> {
        let reply = self
            .transport
            .post(ProfilerCommand::TakePreciseCoverage)
            .await?;
        CoverageSnapshot::from_value(reply)
    }

    /// Stop coverage and close the channel
    ///
    /// The channel is closed even when stopping fails; the session counts as
    /// disconnected afterwards either way.
    ///
    /// # Errors
    ///
    /// Returns the first error from stopping, disabling or closing
    pub async fn disconnect(&mut self) -> CoverageResult<()> {
        let stopped = if self.connected {
            self.stop().await
        } else {
            Ok(())
        };
        self.connected = false;
        let closed = self.transport.close().await;
        debug!("precise coverage stopped");
        stopped.and(closed)
    }

    /// Whether `connect` has succeeded without a later `disconnect`
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Precise coverage parameters
    #[must_use]
    pub const fn config(&self) -> &PreciseCoverageConfig {
        &self.config
    }

    /// The underlying transport
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::result::CoverageError;
    use crate::transport::MockProfiler;

    #[tokio::test]
    async fn test_connect_enables_then_starts() {
        let profiler = MockProfiler::new();
        let mut session = CoverageSession::new(profiler.transport());
        session.connect().await.unwrap();

        assert!(session.is_connected());
        assert!(profiler.is_collecting());
        assert_eq!(
            profiler.history(),
            vec!["open", "Profiler.enable", "Profiler.startPreciseCoverage"]
        );
    }

    #[tokio::test]
    async fn test_snapshot_returns_executed_scripts() {
        let profiler = MockProfiler::new();
        let mut session = CoverageSession::new(profiler.transport());
        session.connect().await.unwrap();

        profiler.execute("file:///project/math.ts");
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(
            snapshot.urls().collect::<Vec<_>>(),
            vec!["file:///project/math.ts"]
        );
    }

    #[tokio::test]
    async fn test_snapshot_before_connect_fails() {
        let profiler = MockProfiler::new();
        let mut session = CoverageSession::new(profiler.transport());
        let err = session.snapshot().await.unwrap_err();
        assert!(matches!(err, CoverageError::ChannelClosed { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_stops_disables_closes() {
        let profiler = MockProfiler::new();
        let mut session = CoverageSession::new(profiler.transport());
        session.connect().await.unwrap();
        session.disconnect().await.unwrap();

        assert!(!session.is_connected());
        assert!(!profiler.is_open());
        let history = profiler.history();
        assert_eq!(
            &history[3..],
            ["Profiler.stopPreciseCoverage", "Profiler.disable", "close"]
        );
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_only_closes() {
        let profiler = MockProfiler::new();
        let mut session = CoverageSession::new(profiler.transport());
        session.disconnect().await.unwrap();
        assert_eq!(profiler.history(), vec!["close"]);
    }

    #[tokio::test]
    async fn test_connect_failure_propagates() {
        let profiler = MockProfiler::new();
        profiler.fail_on("Profiler.enable");
        let mut session = CoverageSession::new(profiler.transport());

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, CoverageError::Protocol { .. }));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_failed_start_closes_channel() {
        let profiler = MockProfiler::new();
        profiler.fail_on("Profiler.startPreciseCoverage");
        let mut session = CoverageSession::new(profiler.transport());

        assert!(session.connect().await.is_err());
        assert!(!profiler.is_open());
        assert_eq!(profiler.history().last().map(String::as_str), Some("close"));
    }

    #[tokio::test]
    async fn test_failed_stop_still_closes() {
        let profiler = MockProfiler::new();
        let mut session = CoverageSession::new(profiler.transport());
        session.connect().await.unwrap();
        profiler.fail_on("Profiler.stopPreciseCoverage");

        let err = session.disconnect().await.unwrap_err();
        assert!(matches!(err, CoverageError::Protocol { .. }));
        assert!(!session.is_connected());
        assert!(!profiler.is_open());
        assert!(!profiler.is_collecting());
    }

    #[tokio::test]
    async fn test_custom_config_is_used() {
        let profiler = MockProfiler::new();
        let session = CoverageSession::new(profiler.transport())
            .with_config(PreciseCoverageConfig::new().with_detailed(true));
        assert!(session.config().detailed);
    }
}
