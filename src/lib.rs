//! # ingestvisor
//!
//! **Ingestvisor** supervises external encoder processes ("ingest workers")
//! that pull media from a stream or file source and push it into a
//! live-streaming server.
//!
//! Workers are provisioned two ways, sharing one registry, one channel-id
//! allocator and one polling loop:
//! - **static**: one always-on worker per compiled ingest directive;
//! - **dynamic**: workers created on demand through [`Supervisor::add`] and
//!   kept alive by heartbeats or an explicit control signal.
//!
//! ## Architecture
//! ```text
//!   DirectiveSource (TOML tree)          ReloadEvent (mpsc)
//!            │ compile                           │
//!            ▼                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Mutex<Registry>  (workers, templates, channel allocator)       │
//! │  - Bus              (broadcast events)                            │
//! │  - SubscriberSet    (fans out to user subscribers)                │
//! │  - StatusReporter   (throttled status line)                       │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//!   │IngestWorker │   │IngestWorker │   │IngestWorker │  one per ChannelId
//!   │ Activity    │   │ Activity    │   │ Activity    │  liveness OR control
//!   └──────┬──────┘   └──────┬──────┘   └──────┬──────┘
//!          ▼                 ▼                 ▼
//!     dyn Process       dyn Process       dyn Process     ffmpeg via tokio::process
//! ```
//!
//! ### Tick
//! ```text
//! every tick_interval:
//!   per worker: expire heartbeat → inactive? stop (+ defer delete if pending)
//!                                 → active?   start (budget) → cycle
//!   delete deferred, log one sampled status line
//! ```
//!
//! ## Features
//! | Area              | Description                                                        | Key types / traits                     |
//! |-------------------|--------------------------------------------------------------------|----------------------------------------|
//! | **Directives**    | TOML ingest configuration, reload diffs.                           | [`DirectiveTree`], [`DirectiveSource`] |
//! | **Templates**     | Validated recipes compiled from directives.                        | [`ProvisioningTemplate`], [`TemplateKey`] |
//! | **Channels**      | Tagged 16-bit ids; file ids carry a tag bit.                       | [`ChannelId`], [`ChannelAllocator`]    |
//! | **Processes**     | Encoder launch, graceful stop with kill escalation.                | [`Process`], [`FfmpegProcess`]         |
//! | **Observability** | Lifecycle events fanned out to subscribers.                        | [`Event`], [`EventKind`], [`Subscribe`] |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber that renders events through `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use ingestvisor::{DirectiveTree, RequestParams, Supervisor, SupervisorConfig, TemplateKey};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tree = DirectiveTree::load("ingest.toml")?;
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_directives(Arc::new(tree))
//!         .build();
//!     sup.start().await;
//!
//!     let out = sup
//!         .add(
//!             &TemplateKey::new("live", "cam1"),
//!             RequestParams {
//!                 ip: "10.0.0.7".into(),
//!                 channel: "001".into(),
//!                 ..Default::default()
//!             },
//!         )
//!         .await?;
//!     sup.activate(out.channel, None).await?;
//!     println!("publishing to {}", out.output_url);
//!
//!     sup.run().await;
//!     Ok(())
//! }
//! ```

mod channel;
mod config;
mod core;
mod directives;
mod error;
mod events;
mod process;
mod subscribers;
mod templates;
mod worker;

#[cfg(test)]
mod test_support;

// ---- Public re-exports ----

pub use channel::{ChannelAllocator, ChannelId, FILE_TAG};
pub use config::{ProvisioningMode, SupervisorConfig};
pub use core::{Supervisor, SupervisorBuilder};
pub use directives::{
    DEFAULT_HEARTBEAT_GRACE, DirectiveSource, DirectiveTree, EngineDirective, IngestDirective, InputDirective,
    ReloadEvent, VhostDirective,
};
pub use error::{ConfigError, IngestError, ProcessError};
pub use events::{Bus, Event, EventKind};
pub use process::{EncodeMode, EncoderSpec, FfmpegFactory, FfmpegProcess, Process, ProcessFactory, null_device};
pub use subscribers::{Subscribe, SubscriberSet};
pub use templates::{
    CompileReport, DEFAULT_VHOST, EngineProfile, ProvisioningTemplate, SourceClass, TemplateKey, compile_ingest,
    compile_vhost, listen_port, placeholder,
};
pub use worker::{Activity, IngestWorker, OutputDescriptor, RequestParams, StartOutcome, WorkerOrigin, WorkerSnapshot};

// Optional: built-in tracing subscriber.
// Enable with: `--features logging` (on by default)
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
