//! Error types used by the ingest supervisor.
//!
//! This module defines three error enums:
//!
//! - [`ConfigError`]: a directive could not be compiled into a template, or the
//!   directive file could not be loaded.
//! - [`IngestError`]: provisioning API and tick failures.
//! - [`ProcessError`]: failures reported by an encoder process wrapper.
//!
//! Every enum provides `as_label` (stable snake_case label for logs/metrics).

use std::path::PathBuf;

use thiserror::Error;

use crate::channel::ChannelId;
use crate::templates::TemplateKey;

/// # Errors produced while compiling or loading ingest directives.
///
/// Compile errors are isolated per directive: the compiler logs them, skips the
/// offending directive and keeps going.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required directive field is absent or empty.
    #[error("ingest {ingest:?}: required field `{field}` is missing or empty")]
    FieldMissing {
        /// Ingest directive name.
        ingest: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The directive must declare exactly one engine block.
    #[error("ingest {ingest:?}: expected exactly one engine block, found {count}")]
    EngineCountInvalid {
        /// Ingest directive name.
        ingest: String,
        /// Number of engine blocks found.
        count: usize,
    },

    /// The directive's input type is neither `stream` nor `file`.
    #[error("ingest {ingest:?}: invalid input type {input_type:?}")]
    InputTypeInvalid {
        /// Ingest directive name.
        ingest: String,
        /// Offending value.
        input_type: String,
    },

    /// Directive lookup on reload found nothing.
    #[error("no directive for vhost {vhost:?} ingest {ingest:?}")]
    DirectiveNotFound {
        /// Virtual host name.
        vhost: String,
        /// Ingest directive name.
        ingest: String,
    },

    /// Reading the directive file failed.
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The directive file is not valid TOML for [`DirectiveTree`](crate::DirectiveTree).
    #[error("failed to parse directives: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use ingestvisor::ConfigError;
    ///
    /// let err = ConfigError::FieldMissing { ingest: "cam1".into(), field: "ffmpeg" };
    /// assert_eq!(err.as_label(), "config_field_missing");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::FieldMissing { .. } => "config_field_missing",
            ConfigError::EngineCountInvalid { .. } => "config_engine_count_invalid",
            ConfigError::InputTypeInvalid { .. } => "input_type_invalid",
            ConfigError::DirectiveNotFound { .. } => "directive_not_found",
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse(_) => "config_parse",
        }
    }
}

/// # Errors produced by the provisioning API and the polling tick.
///
/// Provisioning errors are returned synchronously and never leave the registry
/// half-updated. Tick errors abort the current pass and are retried after the
/// tick interval.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum IngestError {
    /// No provisioning template is registered under the identity.
    #[error("no ingest template for {0}")]
    NoSuchTemplate(TemplateKey),

    /// File-class templates need both `starttime` and `endtime`.
    #[error("ingest {0} is file-backed and requires both start and end time")]
    TimeRangeRequired(TemplateKey),

    /// No worker holds the channel.
    #[error("no worker on channel {0}")]
    NoSuchChannel(ChannelId),

    /// The scalar id is outside the dynamically removable space.
    #[error("channel id {0} cannot be removed through the provisioning api")]
    InvalidChannel(u32),

    /// Every id in the source class is in use.
    #[error("channel space exhausted for {0} sources")]
    AllocationExhausted(&'static str),

    /// The encoder process could not be started.
    #[error("worker {uri} on channel {channel}: start failed: {source}")]
    ProcessStartFailed {
        /// Worker uri (`vhost/ingest`).
        uri: String,
        /// Worker channel.
        channel: ChannelId,
        /// Wrapper error.
        #[source]
        source: ProcessError,
    },

    /// The per-tick health check of the encoder process failed.
    #[error("worker {uri} on channel {channel}: cycle failed: {source}")]
    ProcessCycleFailed {
        /// Worker uri (`vhost/ingest`).
        uri: String,
        /// Worker channel.
        channel: ChannelId,
        /// Wrapper error.
        #[source]
        source: ProcessError,
    },

    /// Constructing the process handle for a new worker failed.
    #[error("failed to construct encoder for {key}: {source}")]
    AllocFailed {
        /// Template identity.
        key: TemplateKey,
        /// Wrapper error.
        #[source]
        source: ProcessError,
    },
}

impl IngestError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use ingestvisor::IngestError;
    ///
    /// assert_eq!(IngestError::InvalidChannel(7).as_label(), "invalid_channel");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            IngestError::NoSuchTemplate(_) => "no_such_template",
            IngestError::TimeRangeRequired(_) => "time_range_required",
            IngestError::NoSuchChannel(_) => "no_such_channel",
            IngestError::InvalidChannel(_) => "invalid_channel",
            IngestError::AllocationExhausted(_) => "allocation_exhausted",
            IngestError::ProcessStartFailed { .. } => "process_start_failed",
            IngestError::ProcessCycleFailed { .. } => "process_cycle_failed",
            IngestError::AllocFailed { .. } => "alloc_failed",
        }
    }
}

/// # Errors reported by encoder process wrappers.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Spawning the encoder binary failed.
    #[error("failed to spawn {binary:?}: {source}")]
    Spawn {
        /// Binary path.
        binary: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Opening the encoder log file failed.
    #[error("failed to open encoder log {path:?}: {source}")]
    Log {
        /// Log path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Polling the child for exit status failed.
    #[error("failed to poll encoder pid {pid}: {source}")]
    Wait {
        /// Child pid.
        pid: u32,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The encoder spec is unusable (empty binary, input or output).
    #[error("invalid encoder spec: {0}")]
    InvalidSpec(String),
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Spawn { .. } => "process_spawn",
            ProcessError::Log { .. } => "process_log",
            ProcessError::Wait { .. } => "process_wait",
            ProcessError::InvalidSpec(_) => "process_invalid_spec",
        }
    }
}
