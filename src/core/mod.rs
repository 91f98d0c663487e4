//! Runtime core: registry, polling loop and lifecycle.
//!
//! The only public API from this module is [`Supervisor`] and its
//! [`SupervisorBuilder`].
//!
//! Internal modules:
//! - [`supervisor`]: provisioning api, tick, reload handling and shutdown;
//! - [`registry`]: workers, templates and the channel allocator;
//! - [`status`]: throttled status line sampled during the tick;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod registry;
mod shutdown;
mod status;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use supervisor::Supervisor;
