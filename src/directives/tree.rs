//! # TOML directive tree.
//!
//! [`DirectiveTree`] is the stock [`DirectiveSource`]: a serde model of the
//! ingest section of the media server's configuration.
//!
//! ```toml
//! listen = ["1935"]
//! ffmpeg_log_dir = "./objs"
//!
//! [[vhost]]
//! name = "live"
//! heartbeat_grace_secs = 180
//! segment_dir = "./objs/nginx/html"
//!
//! [[vhost.ingest]]
//! name = "cam1"
//! ffmpeg = "/usr/bin/ffmpeg"
//! input = { type = "stream", url = "rtsp://[username]:[password]@[ip]/[channel]" }
//!
//! [[vhost.ingest.engine]]
//! name = "copy"
//! output = "rtmp://127.0.0.1:[port]/[vhost]/[channel]"
//! ```
//!
//! Vhosts and ingests default to enabled; engines default to disabled
//! (passthrough copy).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::source::{DEFAULT_HEARTBEAT_GRACE, DirectiveSource, ReloadEvent};
use crate::error::ConfigError;

/// Root of the ingest configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectiveTree {
    /// Media server listen endpoints (`"1935"`, `"0.0.0.0:1935"`).
    #[serde(default)]
    pub listen: Vec<String>,
    /// Directory for per-worker encoder logs.
    #[serde(default)]
    pub ffmpeg_log_dir: Option<PathBuf>,
    #[serde(default, rename = "vhost")]
    pub vhosts: Vec<VhostDirective>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VhostDirective {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Heartbeat grace in seconds; 180 when absent.
    #[serde(default)]
    pub heartbeat_grace_secs: Option<u64>,
    /// HLS root; segments live under `{segment_dir}/live/`.
    #[serde(default)]
    pub segment_dir: Option<PathBuf>,
    #[serde(default, rename = "ingest")]
    pub ingests: Vec<IngestDirective>,
}

/// One source to pull and how to deliver it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestDirective {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub input: Option<InputDirective>,
    /// Encoder binary path.
    #[serde(default)]
    pub ffmpeg: Option<String>,
    #[serde(default, rename = "engine")]
    pub engines: Vec<EngineDirective>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputDirective {
    /// `stream` or `file`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
}

/// Transcode engine block. Disabled engines mean passthrough copy.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineDirective {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub vparams: Vec<String>,
    #[serde(default)]
    pub aparams: Vec<String>,
    /// Output URL template.
    #[serde(default)]
    pub output: Option<String>,
}

fn default_true() -> bool {
    true
}

impl DirectiveTree {
    /// Parses a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Tree with one vhost, listening on 1935.
    pub fn single_vhost(vhost: impl Into<String>, ingests: Vec<IngestDirective>) -> Self {
        Self {
            listen: vec!["1935".into()],
            ffmpeg_log_dir: None,
            vhosts: vec![VhostDirective {
                name: vhost.into(),
                enabled: true,
                heartbeat_grace_secs: None,
                segment_dir: None,
                ingests,
            }],
        }
    }

    /// Reload events that turn `self` into `next`.
    ///
    /// A changed listen list marks every surviving ingest as updated, since
    /// `[port]` is resolved at compile time.
    pub fn diff(&self, next: &DirectiveTree) -> Vec<ReloadEvent> {
        let mut events = Vec::new();
        let listen_changed = self.listen != next.listen;

        for vhost in self.vhosts() {
            if next.vhost(&vhost).is_none() {
                events.push(ReloadEvent::VhostRemoved { vhost });
            }
        }

        for vhost in next.vhosts() {
            if self.vhost(&vhost).is_none() {
                events.push(ReloadEvent::VhostAdded { vhost });
                continue;
            }

            let before = self.ingests(&vhost);
            let after = next.ingests(&vhost);
            for old in &before {
                if !after.iter().any(|d| d.name == old.name) {
                    events.push(ReloadEvent::IngestRemoved {
                        vhost: vhost.clone(),
                        ingest: old.name.clone(),
                    });
                }
            }
            for new in &after {
                let ingest = new.name.clone();
                match before.iter().find(|d| d.name == new.name) {
                    None => events.push(ReloadEvent::IngestAdded {
                        vhost: vhost.clone(),
                        ingest,
                    }),
                    Some(old) if old != new || listen_changed => events.push(ReloadEvent::IngestUpdated {
                        vhost: vhost.clone(),
                        ingest,
                    }),
                    Some(_) => {}
                }
            }
        }
        events
    }

    fn vhost(&self, name: &str) -> Option<&VhostDirective> {
        self.vhosts.iter().find(|v| v.enabled && v.name == name)
    }
}

impl DirectiveSource for DirectiveTree {
    fn vhosts(&self) -> Vec<String> {
        self.vhosts
            .iter()
            .filter(|v| v.enabled)
            .map(|v| v.name.clone())
            .collect()
    }

    fn ingests(&self, vhost: &str) -> Vec<IngestDirective> {
        self.vhost(vhost)
            .map(|v| v.ingests.clone())
            .unwrap_or_default()
    }

    fn listens(&self) -> Vec<String> {
        self.listen.clone()
    }

    fn ffmpeg_log_dir(&self) -> Option<PathBuf> {
        self.ffmpeg_log_dir.clone()
    }

    fn heartbeat_grace(&self, vhost: &str) -> Duration {
        self.vhost(vhost)
            .and_then(|v| v.heartbeat_grace_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEARTBEAT_GRACE)
    }

    fn segment_dir(&self, vhost: &str) -> Option<PathBuf> {
        self.vhost(vhost).and_then(|v| v.segment_dir.clone())
    }
}
