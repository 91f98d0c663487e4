//! Ingest directives: the configuration store consumed by the supervisor.
//!
//! ## Contents
//! - [`DirectiveSource`] read-only view over vhosts, ingest directives and listen endpoints
//! - [`ReloadEvent`] hot-reload notifications delivered to the supervisor
//! - [`DirectiveTree`] TOML-backed [`DirectiveSource`] implementation

mod source;
mod tree;

pub use source::{DEFAULT_HEARTBEAT_GRACE, DirectiveSource, ReloadEvent};
pub use tree::{DirectiveTree, EngineDirective, IngestDirective, InputDirective, VhostDirective};
