//! Ingest workers: one per channel, each owning one encoder process.
//!
//! ## Contents
//! - [`Activity`] the two independent activity signals and their OR
//! - [`IngestWorker`] per-channel state machine around a `dyn Process`
//! - [`RequestParams`] / [`WorkerOrigin`] / [`OutputDescriptor`] provisioning inputs and outputs
//! - [`WorkerSnapshot`] read-only view returned by `Supervisor::list`

mod activity;
mod ingest;
mod request;

pub use activity::Activity;
pub use ingest::{IngestWorker, StartOutcome, WorkerSnapshot};
pub use request::{OutputDescriptor, RequestParams, WorkerOrigin};
