//! Analysis client: a fixed-budget timeout race around the provider call.
//!
//! The provider call and a timer contend; whichever settles first wins.
//! `tokio::time::timeout` drops the losing future, so exactly one winner's
//! result is ever observed — a late-resolving provider call cannot
//! overwrite state set by the timeout path. Cancellation of the underlying
//! transport is cooperative at best and is not relied upon.
//!
//! The client performs no retries; the degrade policy lives one layer up in
//! the orchestrator.

use crate::error::AnalysisError;
use crate::pipeline::provider::{AnalysisProvider, ProviderResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wraps a provider with the pipeline's timeout budget.
#[derive(Clone)]
pub struct AnalysisClient {
    provider: Arc<dyn AnalysisProvider>,
    timeout: Duration,
}

impl AnalysisClient {
    pub fn new(provider: Arc<dyn AnalysisProvider>, timeout_secs: u64) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Run one analysis call under the timeout budget.
    ///
    /// Never panics and never lets a provider error escape as anything but
    /// an [`AnalysisError`]; a timeout is reported as its own variant,
    /// distinguishable from a provider-reported failure.
    pub async fn analyze(
        &self,
        image_data_uri: &str,
        prompt: &str,
    ) -> Result<ProviderResponse, AnalysisError> {
        debug!(timeout_secs = self.timeout.as_secs(), "Dispatching analysis call");
        match tokio::time::timeout(self.timeout, self.provider.analyze(image_data_uri, prompt))
            .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(AnalysisError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }
}
