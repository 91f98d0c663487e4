//! External encoder processes.
//!
//! ## Contents
//! - [`EncoderSpec`] / [`EncodeMode`] everything needed to launch one encoder
//! - [`Process`] / [`ProcessFactory`] seam between workers and the OS
//! - [`FfmpegProcess`] / [`FfmpegFactory`] the `tokio::process` backed implementation
//!
//! Workers only talk to `dyn Process`; tests swap in a recording fake through
//! [`ProcessFactory`].

mod ffmpeg;
mod handle;
mod spec;

pub use ffmpeg::{FfmpegFactory, FfmpegProcess};
pub use handle::{Process, ProcessFactory};
pub use spec::{EncodeMode, EncoderSpec, null_device};
