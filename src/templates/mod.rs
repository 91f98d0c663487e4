//! Provisioning templates compiled from ingest directives.
//!
//! ## Contents
//! - [`TemplateKey`] identity of one template (`vhost/ingest`, default vhost collapsed)
//! - [`SourceClass`] stream (continuous, reusable) vs file (bounded, one-shot)
//! - [`EngineProfile`] optional transcode profile; absent means passthrough copy
//! - [`ProvisioningTemplate`] validated recipe for building workers
//! - [`compile_vhost`] / [`compile_ingest`] directive → template compilation
//! - [`placeholder`] plain string placeholder substitution

mod compiler;
pub mod placeholder;
mod template;

pub use compiler::{CompileReport, compile_ingest, compile_vhost, listen_port};
pub use template::{DEFAULT_VHOST, EngineProfile, ProvisioningTemplate, SourceClass, TemplateKey};
