//! # Encoder launch specification.
//!
//! [`EncoderSpec`] collects the binary, URLs, log target and codec mode, and
//! renders the encoder command line:
//!
//! ```text
//! <input_params..> -i <input> <codec args..> -f <format> -y <output>
//!
//! codec args (copy):       -vcodec copy -acodec copy
//! codec args (transcode):  -vcodec <v> <vparams..> -acodec <a> <aparams..>
//! ```

use std::path::PathBuf;

use crate::error::ProcessError;
use crate::templates::EngineProfile;

/// Codec handling for one encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeMode {
    /// Passthrough copy of both streams.
    Copy,
    /// Re-encode with the given profile.
    Transcode(EngineProfile),
}

/// Platform null device used when encoder logs are disabled.
pub fn null_device() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("NUL")
    } else {
        PathBuf::from("/dev/null")
    }
}

/// Everything needed to launch one encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderSpec {
    pub binary: PathBuf,
    pub input: String,
    pub output: String,
    /// Target for encoder stdout/stderr.
    pub log_path: PathBuf,
    pub output_format: String,
    pub input_params: Vec<String>,
    pub mode: EncodeMode,
    /// Restarts allowed after the first start. `None` is unbounded.
    pub max_reconnects: Option<u32>,
}

impl EncoderSpec {
    /// Copy-mode spec writing `flv` with logs discarded.
    pub fn new(binary: impl Into<PathBuf>, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            input: input.into(),
            output: output.into(),
            log_path: null_device(),
            output_format: "flv".to_string(),
            input_params: Vec::new(),
            mode: EncodeMode::Copy,
            max_reconnects: None,
        }
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    pub fn with_input_params(mut self, params: Vec<String>) -> Self {
        self.input_params = params;
        self
    }

    pub fn with_mode(mut self, mode: EncodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_reconnects(mut self, max: Option<u32>) -> Self {
        self.max_reconnects = max;
        self
    }

    /// Rejects specs with an empty binary, input or output.
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.binary.as_os_str().is_empty() {
            return Err(ProcessError::InvalidSpec("empty encoder binary".into()));
        }
        if self.input.is_empty() {
            return Err(ProcessError::InvalidSpec("empty input url".into()));
        }
        if self.output.is_empty() {
            return Err(ProcessError::InvalidSpec("empty output url".into()));
        }
        Ok(())
    }

    /// Encoder command line, binary excluded.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.input_params.clone();
        args.push("-i".into());
        args.push(self.input.clone());

        match &self.mode {
            EncodeMode::Copy => {
                args.extend(["-vcodec", "copy", "-acodec", "copy"].map(String::from));
            }
            EncodeMode::Transcode(profile) => {
                args.push("-vcodec".into());
                args.push(profile.vcodec.clone());
                args.extend(profile.vparams.iter().cloned());
                args.push("-acodec".into());
                args.push(profile.acodec.clone());
                args.extend(profile.aparams.iter().cloned());
            }
        }

        args.push("-f".into());
        args.push(self.output_format.clone());
        args.push("-y".into());
        args.push(self.output.clone());
        args
    }
}
