//! # Runtime events emitted by the supervisor.
//!
//! The [`EventKind`] enum classifies events across four groups:
//! - **Subscriber events**: fan-out health (panics, overflow)
//! - **Template events**: directive compilation and removal
//! - **Worker events**: provisioning and encoder lifecycle per channel
//! - **Loop events**: tick failures and shutdown
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use ingestvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerAdded)
//!     .with_channel(65537)
//!     .with_identity("live/rec");
//!
//! assert_eq!(ev.kind, EventKind::WorkerAdded);
//! assert_eq!(ev.channel, Some(65537));
//! assert_eq!(ev.identity.as_deref(), Some("live/rec"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `identity`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `identity`: subscriber name
    /// - `reason`: `full` or `closed`
    SubscriberOverflow,

    // === Template events ===
    /// A directive compiled into a template (inserted or replaced).
    ///
    /// Sets:
    /// - `identity`: template key
    TemplateCompiled,

    /// A directive failed validation and was skipped.
    ///
    /// Sets:
    /// - `identity`: template key
    /// - `reason`: error label and message
    TemplateRejected,

    /// A template was dropped by a reload.
    ///
    /// Sets:
    /// - `identity`: template key
    TemplateDropped,

    // === Worker events ===
    /// A new worker was registered.
    ///
    /// Sets:
    /// - `channel`, `identity`
    WorkerAdded,

    /// `add` matched an existing stream worker; nothing was spawned.
    ///
    /// Sets:
    /// - `channel`, `identity`
    WorkerReused,

    /// `activate` was applied (heartbeat or control).
    ///
    /// Sets:
    /// - `channel`, `identity`
    /// - `reason`: `heartbeat` or `control`
    WorkerActivated,

    /// `deactivate` was applied.
    ///
    /// Sets:
    /// - `channel`, `identity`
    WorkerDeactivated,

    /// The encoder process was spawned.
    ///
    /// Sets:
    /// - `channel`, `identity`
    WorkerStarted,

    /// A running encoder process was stopped.
    ///
    /// Sets:
    /// - `channel`, `identity`
    WorkerStopped,

    /// The reconnect budget ran out; the worker deactivated itself.
    ///
    /// Sets:
    /// - `channel`, `identity`
    WorkerExhausted,

    /// The worker left the registry.
    ///
    /// Sets:
    /// - `channel`, `identity`
    /// - `reason`: `removed`, `pending` or `reload`
    WorkerRemoved,

    // === Loop events ===
    /// A tick aborted on a worker error.
    ///
    /// Sets:
    /// - `channel`, `identity` (when the error names a worker)
    /// - `reason`: error message
    TickFailed,

    /// Shutdown requested (token cancelled or OS signal observed).
    ShutdownRequested,

    /// Every worker was stopped and the registry cleared.
    AllStopped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Channel scalar, if applicable.
    pub channel: Option<u32>,
    /// Template key, worker uri or subscriber name.
    pub identity: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            channel: None,
            identity: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = Some(channel);
        self
    }

    #[inline]
    pub fn with_identity(mut self, identity: impl Into<Arc<str>>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_identity(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_identity(subscriber)
            .with_reason(info)
    }
}
