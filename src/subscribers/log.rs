//! # LogWriter: events rendered through `tracing`.
//!
//! Worker lifecycle goes to `info`, failures to `warn`, the rest to `debug`.
//!
//! ```text
//! INFO worker added channel=1 identity=live/cam1
//! WARN worker exhausted channel=65537 identity=live/rec
//! WARN tick failed channel=2 identity=live/cam1 reason=...
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let channel = e.channel;
        let identity = e.identity.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::WorkerAdded => info!(?channel, identity, "worker added"),
            EventKind::WorkerReused => debug!(?channel, identity, "worker reused"),
            EventKind::WorkerActivated => debug!(?channel, identity, reason, "worker activated"),
            EventKind::WorkerDeactivated => debug!(?channel, identity, "worker deactivated"),
            EventKind::WorkerStarted => info!(?channel, identity, "worker started"),
            EventKind::WorkerStopped => info!(?channel, identity, "worker stopped"),
            EventKind::WorkerExhausted => warn!(?channel, identity, "worker exhausted"),
            EventKind::WorkerRemoved => info!(?channel, identity, reason, "worker removed"),
            EventKind::TemplateCompiled => debug!(identity, "template compiled"),
            EventKind::TemplateRejected => warn!(identity, reason, "template rejected"),
            EventKind::TemplateDropped => info!(identity, "template dropped"),
            EventKind::TickFailed => warn!(?channel, identity, reason, "tick failed"),
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStopped => info!("all workers stopped"),
            EventKind::SubscriberOverflow => warn!(subscriber = identity, reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => warn!(subscriber = identity, reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
