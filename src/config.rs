//! # Supervisor configuration.
//!
//! [`SupervisorConfig`] holds the runtime knobs of the supervisor loop. The
//! ingest directives themselves live in a [`DirectiveSource`](crate::DirectiveSource).
//!
//! ## Sentinel values
//! - `tick_interval = 0s` → clamped to 1ms (the loop never spins)
//! - `status_interval = 0s` → status line disabled
//! - `bus_capacity = 0` → clamped to 1
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use ingestvisor::{ProvisioningMode, SupervisorConfig};
//!
//! let mut cfg = SupervisorConfig::default();
//! cfg.mode = ProvisioningMode::Static;
//! cfg.tick_interval = Duration::from_secs(1);
//!
//! assert_eq!(cfg.status_every(), Some(Duration::from_secs(10)));
//! ```

use std::time::Duration;

/// Where workers come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProvisioningMode {
    /// Every compiled template also runs one always-on worker.
    Static,
    /// Workers are created through the provisioning api only.
    #[default]
    Dynamic,
}

/// Runtime configuration of the supervisor.
///
/// ## Field semantics
/// - `tick_interval`: sleep between polling passes, after success and failure alike
/// - `status_interval`: minimum gap between status lines (`0s` = never)
/// - `bus_capacity`: event bus ring buffer size
/// - `mode`: static or dynamic provisioning
/// - `stop_timeout`: wait between SIGTERM and kill for the ffmpeg wrapper
/// - `handle_os_signals`: `run()` also stops on SIGINT/SIGTERM/SIGQUIT
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub tick_interval: Duration,
    pub status_interval: Duration,
    pub bus_capacity: usize,
    pub mode: ProvisioningMode,
    pub stop_timeout: Duration,
    pub handle_os_signals: bool,
}

impl SupervisorConfig {
    /// Tick interval, never zero.
    #[inline]
    pub fn tick_interval_clamped(&self) -> Duration {
        self.tick_interval.max(Duration::from_millis(1))
    }

    /// Status interval as an `Option` (`None` = disabled).
    #[inline]
    pub fn status_every(&self) -> Option<Duration> {
        if self.status_interval == Duration::ZERO {
            None
        } else {
            Some(self.status_interval)
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// - `tick_interval = 3s`
    /// - `status_interval = 10s`
    /// - `bus_capacity = 1024`
    /// - `mode = Dynamic`
    /// - `stop_timeout = 3s`
    /// - `handle_os_signals = true`
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            status_interval: Duration::from_secs(10),
            bus_capacity: 1024,
            mode: ProvisioningMode::default(),
            stop_timeout: Duration::from_secs(3),
            handle_os_signals: true,
        }
    }
}
