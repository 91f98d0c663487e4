//! # Directive source contract.
//!
//! The supervisor never owns configuration. It asks a [`DirectiveSource`] for
//! directives at startup and whenever a [`ReloadEvent`] arrives.
//!
//! ```text
//! config store ──► DirectiveSource ──► compile_vhost / compile_ingest
//!      │
//!      └── ReloadEvent ──► mpsc ──► Supervisor::on_reload
//! ```

use std::path::PathBuf;
use std::time::Duration;

use super::IngestDirective;

/// Heartbeat grace applied when a vhost does not override it.
pub const DEFAULT_HEARTBEAT_GRACE: Duration = Duration::from_secs(180);

/// Read-only view over the media server's ingest configuration.
///
/// Implementations must be cheap to query; the supervisor calls them while
/// holding its registry lock.
pub trait DirectiveSource: Send + Sync + 'static {
    /// Names of all configured vhosts.
    fn vhosts(&self) -> Vec<String>;

    /// All ingest directives declared for `vhost` (enabled or not).
    fn ingests(&self, vhost: &str) -> Vec<IngestDirective>;

    /// Looks up one directive by name.
    fn ingest(&self, vhost: &str, ingest: &str) -> Option<IngestDirective> {
        self.ingests(vhost).into_iter().find(|d| d.name == ingest)
    }

    /// Listen endpoints of the media server; the first one provides `[port]`.
    fn listens(&self) -> Vec<String>;

    /// Directory for per-worker encoder logs. `None` sends encoder output to the null device.
    fn ffmpeg_log_dir(&self) -> Option<PathBuf> {
        None
    }

    /// How long a heartbeat keeps a worker active.
    fn heartbeat_grace(&self, _vhost: &str) -> Duration {
        DEFAULT_HEARTBEAT_GRACE
    }

    /// Directory holding the vhost's HLS segments, if segment cleanup is wanted.
    fn segment_dir(&self, _vhost: &str) -> Option<PathBuf> {
        None
    }
}

/// Configuration change notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReloadEvent {
    /// A vhost appeared; all its directives are compiled.
    VhostAdded { vhost: String },
    /// A vhost disappeared; its workers and templates are dropped.
    VhostRemoved { vhost: String },
    /// One directive appeared.
    IngestAdded { vhost: String, ingest: String },
    /// One directive disappeared.
    IngestRemoved { vhost: String, ingest: String },
    /// One directive changed; handled as remove followed by add.
    IngestUpdated { vhost: String, ingest: String },
}

impl ReloadEvent {
    /// Vhost the event refers to.
    pub fn vhost(&self) -> &str {
        match self {
            ReloadEvent::VhostAdded { vhost }
            | ReloadEvent::VhostRemoved { vhost }
            | ReloadEvent::IngestAdded { vhost, .. }
            | ReloadEvent::IngestRemoved { vhost, .. }
            | ReloadEvent::IngestUpdated { vhost, .. } => vhost,
        }
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReloadEvent::VhostAdded { .. } => "vhost_added",
            ReloadEvent::VhostRemoved { .. } => "vhost_removed",
            ReloadEvent::IngestAdded { .. } => "ingest_added",
            ReloadEvent::IngestRemoved { .. } => "ingest_removed",
            ReloadEvent::IngestUpdated { .. } => "ingest_updated",
        }
    }
}
