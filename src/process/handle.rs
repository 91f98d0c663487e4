//! # Process contract.
//!
//! One [`Process`] is exclusively owned by one worker. All methods are
//! idempotent: starting a running process or stopping a stopped one is a no-op.

use async_trait::async_trait;

use crate::error::ProcessError;
use crate::process::EncoderSpec;

/// Handle to one external encoder.
#[async_trait]
pub trait Process: Send + Sync + 'static {
    /// Spawns the encoder unless it is already running.
    async fn start(&mut self) -> Result<(), ProcessError>;

    /// Graceful stop: terminate and wait, escalating to a kill.
    async fn stop(&mut self);

    /// Best-effort immediate termination signal; does not wait.
    fn fast_stop(&mut self);

    /// Per-tick health check. Reaps an exited encoder so the next start can respawn it.
    async fn cycle(&mut self) -> Result<(), ProcessError>;

    fn is_running(&self) -> bool;

    /// False once the reconnect budget is spent.
    fn can_reconnect(&self) -> bool;

    fn reset_reconnect_count(&mut self);

    /// Resolved output URL.
    fn output(&self) -> &str;
}

/// Builds process handles for new workers.
pub trait ProcessFactory: Send + Sync + 'static {
    /// Validates `spec` and returns an unstarted handle.
    fn create(&self, spec: EncoderSpec) -> Result<Box<dyn Process>, ProcessError>;
}
