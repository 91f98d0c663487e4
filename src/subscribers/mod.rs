//! # Event subscribers.
//!
//! ```text
//! Bus ──► fan-out listener ──► SubscriberSet::emit
//!                                   ├──► [queue] ──► LogWriter (feature `logging`)
//!                                   └──► [queue] ──► custom Subscribe impls
//! ```
//!
//! ## Contents
//! - [`Subscribe`] extension trait
//! - [`SubscriberSet`] bounded, panic-isolated fan-out
//! - [`LogWriter`] built-in `tracing` renderer

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
