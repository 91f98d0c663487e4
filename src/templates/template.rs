//! # Provisioning template data model.
//!
//! A [`ProvisioningTemplate`] is compiled from one enabled ingest directive and
//! is replaced wholesale on recompilation (last write wins).

use std::fmt;
use std::path::PathBuf;

use crate::directives::EngineDirective;

/// Reserved vhost name collapsed out of template identities.
pub const DEFAULT_VHOST: &str = "__defaultVhost__";

/// Kind of media source an ingest pulls from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceClass {
    /// Continuous live pull; workers are reused per source tuple.
    Stream,
    /// Bounded time range; workers are single-shot.
    File,
}

impl SourceClass {
    /// Parses a directive input type (`stream` / `file`, case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("stream") {
            Some(SourceClass::Stream)
        } else if value.eq_ignore_ascii_case("file") {
            Some(SourceClass::File)
        } else {
            None
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceClass::Stream => "stream",
            SourceClass::File => "file",
        }
    }

    /// How many times a dynamic worker's encoder may be restarted after it exits.
    pub fn reconnect_budget(&self) -> u32 {
        match self {
            SourceClass::Stream => 3,
            SourceClass::File => 1,
        }
    }
}

impl fmt::Display for SourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a provisioning template: vhost plus ingest name.
///
/// Renders as `vhost/ingest`, or just `ingest` on the [`DEFAULT_VHOST`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateKey {
    vhost: String,
    ingest: String,
}

impl TemplateKey {
    pub fn new(vhost: impl Into<String>, ingest: impl Into<String>) -> Self {
        Self {
            vhost: vhost.into(),
            ingest: ingest.into(),
        }
    }

    pub fn vhost(&self) -> &str {
        &self.vhost
    }

    pub fn ingest(&self) -> &str {
        &self.ingest
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vhost == DEFAULT_VHOST {
            f.write_str(&self.ingest)
        } else {
            write!(f, "{}/{}", self.vhost, self.ingest)
        }
    }
}

/// Transcode profile taken from an enabled engine block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineProfile {
    pub name: String,
    pub vcodec: String,
    pub acodec: String,
    pub vparams: Vec<String>,
    pub aparams: Vec<String>,
}

impl EngineProfile {
    /// Builds a profile if the engine is enabled and names both codecs.
    ///
    /// Anything else means passthrough copy.
    pub fn from_directive(engine: &EngineDirective) -> Option<Self> {
        if !engine.enabled {
            return None;
        }
        let vcodec = engine.vcodec.as_deref().filter(|s| !s.is_empty())?;
        let acodec = engine.acodec.as_deref().filter(|s| !s.is_empty())?;
        Some(Self {
            name: engine.name.clone(),
            vcodec: vcodec.to_string(),
            acodec: acodec.to_string(),
            vparams: engine.vparams.clone(),
            aparams: engine.aparams.clone(),
        })
    }
}

/// Validated recipe for provisioning workers of one ingest directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningTemplate {
    pub key: TemplateKey,
    pub class: SourceClass,
    /// Input URL with request placeholders still unresolved.
    pub input: String,
    pub ffmpeg: PathBuf,
    /// Output URL with `[port]` resolved and `[vhost]`/`[channel]` pending.
    pub output: String,
    pub engine: Option<EngineProfile>,
}
