//! chromiumoxide transport.
//!
//! Drives the `Profiler` domain of an already attached [`Page`] with typed
//! CDP commands. Opening and closing are no-ops because the page owns the
//! underlying connection.

use super::{ProfilerCommand, ProfilerTransport};
use crate::result::{CoverageError, CoverageResult};
use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::profiler::{
    DisableParams, EnableParams, StartPreciseCoverageParams, StopPreciseCoverageParams,
    TakePreciseCoverageParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use serde_json::{json, Value};

/// Profiler transport backed by a chromiumoxide page
#[derive(Debug, Clone)]
pub struct ChromiumTransport {
    page: Page,
}

impl ChromiumTransport {
    /// Wrap an attached page
    #[must_use]
    pub const fn new(page: Page) -> Self {
        Self { page }
    }

    /// The underlying page
    #[must_use]
    pub const fn page(&self) -> &Page {
        &self.page
    }
}

#[async_trait]
impl ProfilerTransport for ChromiumTransport {
    async fn open(&mut self) -> CoverageResult<()> {
        Ok(())
    }

    async fn post(&mut self, command: ProfilerCommand) -> CoverageResult<Value> {
        let method = command.method();
        let fail = |e: CdpError| CoverageError::protocol(method, e.to_string());

        match command {
            ProfilerCommand::Enable => {
                self.page.execute(EnableParams::default()).await.map_err(fail)?;
                Ok(json!({}))
            }
            ProfilerCommand::StartPreciseCoverage(config) => {
                let params = StartPreciseCoverageParams::builder()
                    .call_count(config.call_count)
                    .detailed(config.detailed)
                    .allow_triggered_updates(config.allow_triggered_updates)
                    .build();
                let response = self.page.execute(params).await.map_err(fail)?;
                Ok(json!({ "timestamp": response.result.timestamp }))
            }
            ProfilerCommand::TakePreciseCoverage => {
                let response = self
                    .page
                    .execute(TakePreciseCoverageParams::default())
                    .await
                    .map_err(fail)?;
                Ok(json!({
                    "result": serde_json::to_value(&response.result.result)?,
                    "timestamp": response.result.timestamp,
                }))
            }
            ProfilerCommand::StopPreciseCoverage => {
                self.page
                    .execute(StopPreciseCoverageParams::default())
                    .await
                    .map_err(fail)?;
                Ok(json!({}))
            }
            ProfilerCommand::Disable => {
                self.page.execute(DisableParams::default()).await.map_err(fail)?;
                Ok(json!({}))
            }
        }
    }

    async fn close(&mut self) -> CoverageResult<()> {
        Ok(())
    }
}
