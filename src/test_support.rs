//! Shared fixtures for unit tests: a recording fake encoder and directive builders.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::directives::{DirectiveTree, EngineDirective, IngestDirective, InputDirective};
use crate::error::ProcessError;
use crate::process::{EncoderSpec, Process, ProcessFactory};

/// Installs a `tracing` subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counters and switches shared between a [`FakeProcess`] and the test.
#[derive(Default, Debug)]
pub struct Probe {
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    pub fast_stops: AtomicU32,
    pub cycles: AtomicU32,
    pub resets: AtomicU32,
    pub fail_start: AtomicBool,
    pub fail_cycle: AtomicBool,
    /// Next cycle reports the encoder as exited.
    pub exit_on_cycle: AtomicBool,
}

impl Probe {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

/// In-memory [`Process`] with the same reconnect accounting as the ffmpeg wrapper.
pub struct FakeProcess {
    probe: Arc<Probe>,
    running: bool,
    starts: u32,
    max_reconnects: Option<u32>,
    output: String,
}

#[async_trait]
impl Process for FakeProcess {
    async fn start(&mut self) -> Result<(), ProcessError> {
        if self.running {
            return Ok(());
        }
        if self.probe.fail_start.load(Ordering::SeqCst) {
            return Err(ProcessError::InvalidSpec("start refused".into()));
        }
        self.running = true;
        self.starts += 1;
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) {
        if self.running {
            self.probe.stops.fetch_add(1, Ordering::SeqCst);
        }
        self.running = false;
    }

    fn fast_stop(&mut self) {
        self.probe.fast_stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn cycle(&mut self) -> Result<(), ProcessError> {
        self.probe.cycles.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_cycle.load(Ordering::SeqCst) {
            return Err(ProcessError::InvalidSpec("cycle refused".into()));
        }
        if self.probe.exit_on_cycle.swap(false, Ordering::SeqCst) {
            self.running = false;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn can_reconnect(&self) -> bool {
        self.max_reconnects.is_none_or(|max| self.starts <= max)
    }

    fn reset_reconnect_count(&mut self) {
        self.starts = 0;
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn output(&self) -> &str {
        &self.output
    }
}

impl FakeProcess {
    pub fn new(spec: &EncoderSpec) -> (Self, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let process = Self {
            probe: probe.clone(),
            running: false,
            starts: 0,
            max_reconnects: spec.max_reconnects,
            output: spec.output.clone(),
        };
        (process, probe)
    }
}

/// Factory recording every spec it was asked to build.
#[derive(Default)]
pub struct FakeFactory {
    created: Mutex<Vec<(EncoderSpec, Arc<Probe>)>>,
    pub fail_create: AtomicBool,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.lock().len()
    }

    pub fn spec(&self, index: usize) -> EncoderSpec {
        self.lock()[index].0.clone()
    }

    pub fn probe(&self, index: usize) -> Arc<Probe> {
        self.lock()[index].1.clone()
    }

    /// Sum of `field` over every process built so far.
    pub fn total(&self, field: impl Fn(&Probe) -> &AtomicU32) -> u32 {
        self.lock().iter().map(|(_, p)| Probe::get(field(p))).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(EncoderSpec, Arc<Probe>)>> {
        self.created.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProcessFactory for FakeFactory {
    fn create(&self, spec: EncoderSpec) -> Result<Box<dyn Process>, ProcessError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProcessError::InvalidSpec("create refused".into()));
        }
        spec.validate()?;
        let (process, probe) = FakeProcess::new(&spec);
        self.lock().push((spec, probe));
        Ok(Box::new(process))
    }
}

/// Enabled directive with a disabled (copy) engine.
pub fn directive(name: &str, kind: &str, input: &str, output: &str) -> IngestDirective {
    IngestDirective {
        name: name.into(),
        enabled: true,
        input: Some(InputDirective {
            kind: kind.into(),
            url: input.into(),
        }),
        ffmpeg: Some("/usr/bin/ffmpeg".into()),
        engines: vec![EngineDirective {
            name: "copy".into(),
            enabled: false,
            vcodec: None,
            acodec: None,
            vparams: vec![],
            aparams: vec![],
            output: Some(output.into()),
        }],
    }
}

/// `live` vhost with a stream ingest `cam1` and a file ingest `rec`.
pub fn live_tree() -> DirectiveTree {
    DirectiveTree::single_vhost(
        "live",
        vec![
            directive(
                "cam1",
                "stream",
                "rtsp://[username]:[password]@[ip]/[channel]",
                "rtmp://host/[vhost]/[channel]",
            ),
            directive(
                "rec",
                "file",
                "rtsp://[ip]/[channel]?start=[starttime]&end=[endtime]",
                "rtmp://host:[port]/[vhost]/[channel]",
            ),
        ],
    )
}
