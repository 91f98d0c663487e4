//! # ffmpeg process wrapper.
//!
//! [`FfmpegProcess`] runs one encoder through `tokio::process` with stdout and
//! stderr appended to `EncoderSpec::log_path`.
//!
//! ```text
//! start()  ──► spawn (kill_on_drop) ──► starts += 1
//! cycle()  ──► try_wait: exited? ──► drop child (next start respawns)
//! stop()   ──► SIGTERM ──► wait(stop_timeout) ──► timeout? ──► kill
//! fast_stop() ──► SIGTERM, no wait
//! ```
//!
//! The reconnect budget counts restarts after the first successful start:
//! with `max_reconnects = Some(1)` the encoder may be spawned twice.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::process::{EncoderSpec, Process, ProcessFactory};

/// Builds [`FfmpegProcess`] handles.
#[derive(Clone, Debug)]
pub struct FfmpegFactory {
    stop_timeout: Duration,
}

impl FfmpegFactory {
    /// `stop_timeout` bounds the wait between SIGTERM and kill.
    pub fn new(stop_timeout: Duration) -> Self {
        Self { stop_timeout }
    }
}

impl ProcessFactory for FfmpegFactory {
    fn create(&self, spec: EncoderSpec) -> Result<Box<dyn Process>, ProcessError> {
        Ok(Box::new(FfmpegProcess::new(spec, self.stop_timeout)?))
    }
}

/// One encoder child process.
pub struct FfmpegProcess {
    spec: EncoderSpec,
    stop_timeout: Duration,
    child: Option<Child>,
    starts: u32,
}

impl FfmpegProcess {
    pub fn new(spec: EncoderSpec, stop_timeout: Duration) -> Result<Self, ProcessError> {
        spec.validate()?;
        Ok(Self {
            spec,
            stop_timeout,
            child: None,
            starts: 0,
        })
    }

    async fn log_stdio(&self) -> Result<(Stdio, Stdio), ProcessError> {
        let log_err = |source| ProcessError::Log {
            path: self.spec.log_path.clone(),
            source,
        };
        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.spec.log_path)
            .await
            .map_err(log_err)?
            .into_std()
            .await;
        let err = out.try_clone().map_err(log_err)?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }

    /// Sends SIGTERM (unix) or starts a kill (elsewhere).
    fn terminate(child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    debug!(pid, error = %e, "sigterm failed");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }
    }
}

#[async_trait]
impl Process for FfmpegProcess {
    async fn start(&mut self) -> Result<(), ProcessError> {
        if self.child.is_some() {
            return Ok(());
        }

        let (stdout, stderr) = self.log_stdio().await?;
        let child = Command::new(&self.spec.binary)
            .args(self.spec.args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                binary: self.spec.binary.clone(),
                source,
            })?;

        debug!(pid = ?child.id(), output = %self.spec.output, "encoder started");
        self.child = Some(child);
        self.starts = self.starts.saturating_add(1);
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = child.id();

        Self::terminate(&mut child);
        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => debug!(?pid, %status, "encoder stopped"),
            Ok(Err(e)) => warn!(?pid, error = %e, "waiting for encoder failed"),
            Err(_) => {
                warn!(?pid, timeout = ?self.stop_timeout, "encoder ignored sigterm, killing");
                if let Err(e) = child.kill().await {
                    warn!(?pid, error = %e, "kill failed");
                }
            }
        }
    }

    fn fast_stop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            Self::terminate(child);
        }
    }

    async fn cycle(&mut self) -> Result<(), ProcessError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };

        let exited = child.try_wait().map_err(|source| ProcessError::Wait {
            pid: child.id().unwrap_or_default(),
            source,
        })?;

        if let Some(status) = exited {
            warn!(%status, output = %self.spec.output, "encoder exited");
            self.child = None;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn can_reconnect(&self) -> bool {
        self.spec
            .max_reconnects
            .is_none_or(|max| self.starts <= max)
    }

    fn reset_reconnect_count(&mut self) {
        self.starts = 0;
    }

    fn output(&self) -> &str {
        &self.spec.output
    }
}
