//! # Ingest worker state machine.
//!
//! ```text
//!            activate(hb | ctl)                 deactivate() on a File channel
//!  Inactive ───────────────────► Active ─────────────────────────────► PendingRemoval
//!     ▲                            │                                       (terminal)
//!     └── grace expiry / deactivate┘
//! ```
//!
//! - `activate(Some(ts))` is a heartbeat: sets `liveness` and records `ts`.
//! - `activate(None)` sets `control`.
//! - `deactivate()` clears `control`, resets the reconnect budget and, on a
//!   File channel, marks the worker for removal.
//! - A pending worker is never active again and is deleted by the next tick.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::channel::ChannelId;
use crate::error::IngestError;
use crate::process::Process;
use crate::templates::{SourceClass, TemplateKey};
use crate::worker::{Activity, OutputDescriptor, WorkerOrigin};

/// Result of [`IngestWorker::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyRunning,
    Started,
    /// The reconnect budget ran out; the worker deactivated itself.
    Exhausted,
}

/// Diagnostic view of one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub channel: ChannelId,
    pub uri: String,
    pub active: bool,
    pub pending_removal: bool,
    pub running: bool,
    pub output_url: String,
    pub uptime: Duration,
}

/// One channel and the encoder feeding it.
pub struct IngestWorker {
    key: TemplateKey,
    channel: ChannelId,
    origin: WorkerOrigin,
    process: Box<dyn Process>,
    created: Instant,
    last_heartbeat: Option<SystemTime>,
    grace: Duration,
    activity: Activity,
    pending_removal: bool,
    segment_dir: Option<PathBuf>,
}

impl IngestWorker {
    /// Creates an inactive worker around an unstarted process.
    pub fn new(
        key: TemplateKey,
        channel: ChannelId,
        origin: WorkerOrigin,
        process: Box<dyn Process>,
        grace: Duration,
    ) -> Self {
        Self {
            key,
            channel,
            origin,
            process,
            created: Instant::now(),
            last_heartbeat: None,
            grace,
            activity: Activity::default(),
            pending_removal: false,
            segment_dir: None,
        }
    }

    /// HLS root whose `live/` segments are purged when a running encoder stops.
    pub fn with_segment_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.segment_dir = dir;
        self
    }

    pub fn key(&self) -> &TemplateKey {
        &self.key
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn origin(&self) -> &WorkerOrigin {
        &self.origin
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn last_heartbeat(&self) -> Option<SystemTime> {
        self.last_heartbeat
    }

    pub fn is_pending_removal(&self) -> bool {
        self.pending_removal
    }

    /// Effective activity: either signal set and not pending removal.
    pub fn is_active(&self) -> bool {
        !self.pending_removal && self.activity.is_active()
    }

    pub fn is_running(&self) -> bool {
        self.process.is_running()
    }

    /// `vhost/ingest`.
    pub fn uri(&self) -> String {
        self.key.to_string()
    }

    /// Time since the worker was created.
    pub fn alive(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn descriptor(&self) -> OutputDescriptor {
        OutputDescriptor {
            channel: self.channel,
            output_url: self.process.output().to_string(),
        }
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            channel: self.channel,
            uri: self.uri(),
            active: self.is_active(),
            pending_removal: self.pending_removal,
            running: self.is_running(),
            output_url: self.process.output().to_string(),
            uptime: self.alive(),
        }
    }

    /// True for a live Stream worker created from the same source tuple.
    pub fn serves_source(&self, key: &TemplateKey, ip: &str, channel: &str) -> bool {
        if self.pending_removal || self.channel.class() != SourceClass::Stream {
            return false;
        }
        match &self.origin {
            WorkerOrigin::Dynamic { ip: i, channel: c } => &self.key == key && i == ip && c == channel,
            WorkerOrigin::Static => false,
        }
    }

    /// Heartbeat with a timestamp, or an explicit control activation without one.
    pub fn activate(&mut self, heartbeat: Option<SystemTime>) {
        if self.pending_removal {
            debug!(channel = %self.channel, "activation ignored, worker pending removal");
            return;
        }
        match heartbeat {
            Some(at) => {
                self.activity.liveness = true;
                self.last_heartbeat = Some(at);
            }
            None => self.activity.control = true,
        }
    }

    pub fn deactivate(&mut self) {
        self.activity.control = false;
        self.process.reset_reconnect_count();
        if self.channel.class() == SourceClass::File {
            self.pending_removal = true;
        }
    }

    /// Clears `liveness` once `now` is past the last heartbeat plus grace.
    ///
    /// Returns true if the signal was cleared.
    pub fn expire_liveness(&mut self, now: SystemTime) -> bool {
        if !self.activity.liveness {
            return false;
        }
        let Some(last) = self.last_heartbeat else {
            return false;
        };
        // A deadline past the end of `SystemTime` never expires.
        if last.checked_add(self.grace).is_some_and(|deadline| now > deadline) {
            self.activity.liveness = false;
            return true;
        }
        false
    }

    /// Ensures the encoder is running, honouring the reconnect budget.
    pub async fn start(&mut self) -> Result<StartOutcome, IngestError> {
        if self.process.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        if !self.process.can_reconnect() {
            self.deactivate();
            return Ok(StartOutcome::Exhausted);
        }
        self.process
            .start()
            .await
            .map_err(|source| IngestError::ProcessStartFailed {
                uri: self.uri(),
                channel: self.channel,
                source,
            })?;
        Ok(StartOutcome::Started)
    }

    pub async fn cycle(&mut self) -> Result<(), IngestError> {
        self.process
            .cycle()
            .await
            .map_err(|source| IngestError::ProcessCycleFailed {
                uri: self.uri(),
                channel: self.channel,
                source,
            })
    }

    /// Graceful stop. Returns true if an encoder was actually running.
    ///
    /// Stopping a running encoder also purges this channel's HLS segments.
    pub async fn stop(&mut self) -> bool {
        let was_running = self.process.is_running();
        self.process.stop().await;

        if was_running {
            if let Some(root) = &self.segment_dir {
                purge_segments(&root.join("live"), &self.channel.to_string()).await;
            }
        }
        was_running
    }

    pub fn fast_stop(&mut self) {
        self.process.fast_stop();
    }
}

/// Removes files in `dir` whose name is `channel` optionally followed by a non-digit suffix.
async fn purge_segments(dir: &Path, channel: &str) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "no segment dir");
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "segment scan failed");
                break;
            }
        };

        let name = entry.file_name();
        let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(channel)) else {
            continue;
        };
        if matches!(rest.chars().next(), Some(c) if c.is_ascii_digit()) {
            continue;
        }

        let path = entry.path();
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "segment cleanup failed");
        }
    }
}
