//! # Supervisor: registry owner, polling loop and provisioning api.
//!
//! The [`Supervisor`] owns the [`Registry`] (workers, templates, allocator)
//! behind one async mutex. The polling loop, the provisioning api and reload
//! handling all take that lock, so they never interleave.
//!
//! ## Architecture
//! ```text
//! start()      ──► compile every vhost ──► templates (+ static workers)
//!
//! add/activate/deactivate/remove ──┐
//! on_reload(ReloadEvent)          ─┼──► Mutex<State> ──► Registry
//! tick()                          ─┘
//!
//! run():
//!   start()
//!   loop {
//!     tick()  (errors logged, never fatal)
//!     select! { sleep(tick_interval) | token.cancelled() | OS signal }
//!   }
//!   shutdown(): fast_stop all ──► stop all ──► clear ──► AllStopped
//!
//! events: Supervisor ── publish ──► Bus ──► fan-out listener ──► SubscriberSet
//! ```
//!
//! ## Tick
//! ```text
//! for worker in registry (unordered):
//!   expire liveness past grace
//!   inactive?  stop() ; pending removal? defer delete ; next
//!   active:    start() (budget spent → deactivate) ; cycle()
//!              error → abort the pass
//! delete deferred workers
//! status line (skipped when the pass aborted)
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::ChannelId;
use crate::config::{ProvisioningMode, SupervisorConfig};
use crate::core::registry::Registry;
use crate::core::shutdown;
use crate::core::status::StatusReporter;
use crate::directives::{DirectiveSource, ReloadEvent};
use crate::error::{ConfigError, IngestError};
use crate::events::{Bus, Event, EventKind};
use crate::process::{EncodeMode, EncoderSpec, ProcessFactory, null_device};
use crate::subscribers::SubscriberSet;
use crate::templates::placeholder::{self, CHANNEL, END_TIME, IP, PASSWORD, START_TIME, USERNAME, VHOST};
use crate::templates::{ProvisioningTemplate, SourceClass, TemplateKey, compile_ingest, compile_vhost};
use crate::worker::{IngestWorker, OutputDescriptor, RequestParams, StartOutcome, WorkerOrigin, WorkerSnapshot};

/// Everything guarded by the registry lock.
struct State {
    registry: Registry,
    directives: Arc<dyn DirectiveSource>,
    status: StatusReporter,
}

/// Supervises ingest workers under static or dynamic provisioning.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    factory: Arc<dyn ProcessFactory>,
    state: Mutex<State>,
    token: CancellationToken,
    fanout_stop: CancellationToken,
    fanout: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Returns a builder; see [`SupervisorBuilder`](crate::SupervisorBuilder).
    pub fn builder(cfg: SupervisorConfig) -> crate::SupervisorBuilder {
        crate::SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        subs: SubscriberSet,
        factory: Arc<dyn ProcessFactory>,
        directives: Arc<dyn DirectiveSource>,
    ) -> Self {
        let fanout_stop = CancellationToken::new();
        let fanout = spawn_fanout(&bus, subs, fanout_stop.clone());
        let status = StatusReporter::new(cfg.status_every());

        Self {
            cfg,
            bus,
            factory,
            state: Mutex::new(State {
                registry: Registry::new(),
                directives,
                status,
            }),
            token: CancellationToken::new(),
            fanout_stop,
            fanout: Mutex::new(Some(fanout)),
        }
    }

    /// The event bus; subscribe here for raw events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Asks [`run`](Self::run) to leave its loop and shut down.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Compiles every vhost; in static mode also materialises static workers.
    pub async fn start(&self) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        for vhost in state.directives.vhosts() {
            self.compile_vhost_into(state, &vhost);
        }
        info!(
            templates = state.registry.template_keys().len(),
            workers = state.registry.len(),
            mode = ?self.cfg.mode,
            "ingest supervisor started"
        );
    }

    // ---------------------------
    // Provisioning api
    // ---------------------------

    /// Provisions a worker for `key`, or returns the existing one for the same stream source.
    pub async fn add(&self, key: &TemplateKey, params: RequestParams) -> Result<OutputDescriptor, IngestError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let template = state
            .registry
            .template(key)
            .cloned()
            .ok_or_else(|| IngestError::NoSuchTemplate(key.clone()))?;

        if template.class == SourceClass::File && (params.starttime.is_none() || params.endtime.is_none()) {
            return Err(IngestError::TimeRangeRequired(key.clone()));
        }

        if template.class == SourceClass::Stream {
            if let Some(existing) = state.registry.find_source(key, &params.ip, &params.channel) {
                let descriptor = existing.descriptor();
                self.publish_worker(EventKind::WorkerReused, existing);
                return Ok(descriptor);
            }
        }

        let channel = state.registry.allocate(template.class)?;
        let scalar = channel.to_string();
        let input = placeholder::substitute(
            &template.input,
            &[
                (USERNAME, &params.username),
                (PASSWORD, &params.password),
                (IP, &params.ip),
                (CHANNEL, &params.channel),
                (START_TIME, params.starttime.as_deref().unwrap_or_default()),
                (END_TIME, params.endtime.as_deref().unwrap_or_default()),
                (VHOST, key.vhost()),
            ],
        );
        let output = placeholder::substitute(&template.output, &[(VHOST, key.vhost()), (CHANNEL, &scalar)]);

        let spec = self
            .encoder_spec(state.directives.as_ref(), &template, channel, input, output)
            .with_max_reconnects(Some(template.class.reconnect_budget()));
        let origin = WorkerOrigin::Dynamic {
            ip: params.ip,
            channel: params.channel,
        };
        let worker = self.build_worker(state.directives.as_ref(), &template, channel, origin, spec)?;

        let descriptor = worker.descriptor();
        self.publish_worker(EventKind::WorkerAdded, &worker);
        state.registry.insert(worker);
        Ok(descriptor)
    }

    /// Heartbeat (`Some(ts)`) or control activation (`None`).
    pub async fn activate(&self, channel: ChannelId, heartbeat: Option<SystemTime>) -> Result<(), IngestError> {
        let mut state = self.state.lock().await;
        let worker = state
            .registry
            .get_mut(channel)
            .ok_or(IngestError::NoSuchChannel(channel))?;
        worker.activate(heartbeat);

        let via = if heartbeat.is_some() { "heartbeat" } else { "control" };
        self.bus.publish(worker_event(EventKind::WorkerActivated, worker).with_reason(via));
        Ok(())
    }

    /// Clears the control signal; a file worker becomes pending removal.
    pub async fn deactivate(&self, channel: ChannelId) -> Result<(), IngestError> {
        let mut state = self.state.lock().await;
        let worker = state
            .registry
            .get_mut(channel)
            .ok_or(IngestError::NoSuchChannel(channel))?;
        worker.deactivate();
        self.publish_worker(EventKind::WorkerDeactivated, worker);
        Ok(())
    }

    /// Stops and erases a dynamically tagged channel immediately.
    ///
    /// Scalars without a tag bit (stream and static channels) are rejected
    /// with [`IngestError::InvalidChannel`] and leave the registry untouched.
    pub async fn remove(&self, channel: u32) -> Result<(), IngestError> {
        if !ChannelId::is_tagged_scalar(channel) {
            return Err(IngestError::InvalidChannel(channel));
        }
        let id = ChannelId::from_scalar(channel).ok_or(IngestError::InvalidChannel(channel))?;

        let mut state = self.state.lock().await;
        let worker = state
            .registry
            .get_mut(id)
            .ok_or(IngestError::NoSuchChannel(id))?;
        if worker.stop().await {
            self.publish_worker(EventKind::WorkerStopped, worker);
        }
        if let Some(worker) = state.registry.take(id) {
            self.bus
                .publish(worker_event(EventKind::WorkerRemoved, &worker).with_reason("removed"));
        }
        Ok(())
    }

    /// True if the channel is registered and not pending removal.
    pub async fn is_serving(&self, channel: ChannelId) -> bool {
        let state = self.state.lock().await;
        state
            .registry
            .get(channel)
            .is_some_and(|w| !w.is_pending_removal())
    }

    /// Snapshots of every registered worker, ordered by channel.
    pub async fn list(&self) -> Vec<WorkerSnapshot> {
        let state = self.state.lock().await;
        let mut out: Vec<WorkerSnapshot> = state.registry.workers().map(IngestWorker::snapshot).collect();
        out.sort_unstable_by_key(|s| s.channel);
        out
    }

    /// Keys of every installed template, sorted.
    pub async fn templates(&self) -> Vec<TemplateKey> {
        self.state.lock().await.registry.template_keys()
    }

    // ---------------------------
    // Polling loop
    // ---------------------------

    /// One polling pass over the registry.
    ///
    /// The first start/cycle error aborts the pass and is returned; workers
    /// already marked for deletion are still deleted.
    pub async fn tick(&self) -> Result<(), IngestError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = SystemTime::now();
        let mut deferred = Vec::new();
        let mut outcome = Ok(());

        for worker in state.registry.workers_mut() {
            if worker.expire_liveness(now) {
                debug!(channel = %worker.channel(), "heartbeat grace expired");
            }

            if !worker.is_active() {
                if worker.stop().await {
                    self.publish_worker(EventKind::WorkerStopped, worker);
                }
                if worker.is_pending_removal() {
                    deferred.push(worker.channel());
                }
                continue;
            }

            match worker.start().await {
                Ok(StartOutcome::Started) => self.publish_worker(EventKind::WorkerStarted, worker),
                Ok(StartOutcome::AlreadyRunning) => {}
                Ok(StartOutcome::Exhausted) => {
                    self.publish_worker(EventKind::WorkerExhausted, worker);
                    continue;
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }

            if let Err(e) = worker.cycle().await {
                outcome = Err(e);
                break;
            }
        }

        for channel in deferred {
            if let Some(worker) = state.registry.take(channel) {
                self.bus
                    .publish(worker_event(EventKind::WorkerRemoved, &worker).with_reason("pending"));
            }
        }

        if let Err(e) = &outcome {
            let mut ev = Event::new(EventKind::TickFailed).with_reason(e.to_string());
            if let IngestError::ProcessStartFailed { uri, channel, .. }
            | IngestError::ProcessCycleFailed { uri, channel, .. } = e
            {
                ev = ev.with_channel(channel.to_scalar()).with_identity(uri.as_str());
            }
            self.bus.publish(ev);
            return outcome;
        }

        state.status.report(state.registry.workers());
        Ok(())
    }

    /// Runs until [`stop`](Self::stop) or an OS termination signal, then shuts down.
    pub async fn run(&self) {
        self.start().await;

        let handle_signals = self.cfg.handle_os_signals;
        let os_signal = async move {
            if handle_signals {
                match shutdown::wait_for_shutdown_signal().await {
                    Ok(name) => {
                        info!(signal = name, "termination signal received");
                        return;
                    }
                    Err(e) => warn!(error = %e, "signal handlers unavailable"),
                }
            }
            std::future::pending::<()>().await
        };
        tokio::pin!(os_signal);

        let interval = self.cfg.tick_interval_clamped();
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, label = e.as_label(), "ingest tick failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.token.cancelled() => break,
                _ = &mut os_signal => break,
            }
        }

        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.shutdown().await;
    }

    /// Fast-stops every worker, stops them gracefully, clears the registry and
    /// flushes subscribers.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().await;
            for worker in state.registry.workers_mut() {
                worker.fast_stop();
            }
            for worker in state.registry.workers_mut() {
                if worker.stop().await {
                    self.publish_worker(EventKind::WorkerStopped, worker);
                }
            }
            let cleared = state.registry.clear_workers();
            info!(workers = cleared, "ingest workers disposed");
        }
        self.bus.publish(Event::new(EventKind::AllStopped));

        self.fanout_stop.cancel();
        if let Some(handle) = self.fanout.lock().await.take() {
            let _ = handle.await;
        }
    }

    // ---------------------------
    // Reload
    // ---------------------------

    /// Swaps the directive source consulted by later compiles.
    ///
    /// Call this before delivering the [`ReloadEvent`]s that describe the change.
    pub async fn replace_directives(&self, directives: Arc<dyn DirectiveSource>) {
        self.state.lock().await.directives = directives;
    }

    /// Applies one reload event.
    ///
    /// Errors are logged; partially applied removals are not rolled back.
    pub async fn on_reload(&self, event: ReloadEvent) {
        debug!(event = event.as_label(), vhost = event.vhost(), "reload");
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        match event {
            ReloadEvent::VhostAdded { vhost } => self.compile_vhost_into(state, &vhost),
            ReloadEvent::VhostRemoved { vhost } => {
                self.drop_matching(state, DropScope::Vhost(&vhost)).await;
            }
            ReloadEvent::IngestAdded { vhost, ingest } => self.compile_ingest_into(state, &vhost, &ingest),
            ReloadEvent::IngestRemoved { vhost, ingest } => {
                let key = TemplateKey::new(vhost, ingest);
                self.drop_matching(state, DropScope::Ingest(&key)).await;
            }
            ReloadEvent::IngestUpdated { vhost, ingest } => {
                let key = TemplateKey::new(vhost.as_str(), ingest.as_str());
                self.drop_matching(state, DropScope::Ingest(&key)).await;
                self.compile_ingest_into(state, &vhost, &ingest);
            }
        }
    }

    /// Feeds reload events from `rx` into [`on_reload`](Self::on_reload) until
    /// the channel closes or the supervisor stops.
    pub fn spawn_reload_listener(self: &Arc<Self>, mut rx: mpsc::Receiver<ReloadEvent>) -> JoinHandle<()> {
        let me = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = me.token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(ev) => me.on_reload(ev).await,
                        None => break,
                    }
                }
            }
        })
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    fn compile_vhost_into(&self, state: &mut State, vhost: &str) {
        let report = compile_vhost(state.directives.as_ref(), vhost);
        for (key, err) in report.rejected {
            self.reject(&key, &err);
        }
        for template in report.templates {
            self.install(state, template);
        }
    }

    fn compile_ingest_into(&self, state: &mut State, vhost: &str, ingest: &str) {
        let key = TemplateKey::new(vhost, ingest);
        let Some(directive) = state.directives.ingest(vhost, ingest) else {
            let err = ConfigError::DirectiveNotFound {
                vhost: vhost.to_string(),
                ingest: ingest.to_string(),
            };
            self.reject(&key, &err);
            return;
        };

        match compile_ingest(vhost, &directive, &state.directives.listens()) {
            Ok(Some(template)) => self.install(state, template),
            Ok(None) => debug!(ingest = %key, "directive disabled"),
            Err(err) => self.reject(&key, &err),
        }
    }

    fn reject(&self, key: &TemplateKey, err: &ConfigError) {
        warn!(ingest = %key, label = err.as_label(), error = %err, "directive rejected");
        self.bus.publish(
            Event::new(EventKind::TemplateRejected)
                .with_identity(key.to_string())
                .with_reason(err.to_string()),
        );
    }

    fn install(&self, state: &mut State, template: ProvisioningTemplate) {
        let key = template.key.clone();
        state.registry.upsert_template(template);
        self.bus
            .publish(Event::new(EventKind::TemplateCompiled).with_identity(key.to_string()));

        if self.cfg.mode == ProvisioningMode::Static && !state.registry.has_static(&key) {
            if let Err(e) = self.materialise_static(state, &key) {
                warn!(ingest = %key, label = e.as_label(), error = %e, "static worker not created");
            }
        }
    }

    /// Creates the always-on worker of a static template.
    ///
    /// Only `[vhost]` and `[channel]` are resolved. Request-scoped tokens
    /// (`[ip]`, `[starttime]`, ...) have no value here and reach the encoder
    /// as written, so static directives should use literal input urls.
    fn materialise_static(&self, state: &mut State, key: &TemplateKey) -> Result<(), IngestError> {
        let template = state
            .registry
            .template(key)
            .cloned()
            .ok_or_else(|| IngestError::NoSuchTemplate(key.clone()))?;

        let channel = state.registry.allocate(SourceClass::Stream)?;
        let scalar = channel.to_string();
        let input = placeholder::substitute(&template.input, &[(VHOST, key.vhost())]);
        let output = placeholder::substitute(&template.output, &[(VHOST, key.vhost()), (CHANNEL, &scalar)]);

        let input_params = match template.class {
            SourceClass::File => vec!["-re".to_string()],
            SourceClass::Stream => Vec::new(),
        };
        let spec = self
            .encoder_spec(state.directives.as_ref(), &template, channel, input, output)
            .with_input_params(input_params);
        let mut worker = self.build_worker(state.directives.as_ref(), &template, channel, WorkerOrigin::Static, spec)?;
        worker.activate(None);

        self.publish_worker(EventKind::WorkerAdded, &worker);
        state.registry.insert(worker);
        Ok(())
    }

    fn encoder_spec(
        &self,
        directives: &dyn DirectiveSource,
        template: &ProvisioningTemplate,
        channel: ChannelId,
        input: String,
        output: String,
    ) -> EncoderSpec {
        let log_path = match directives.ffmpeg_log_dir() {
            Some(dir) => dir.join(format!(
                "ffmpeg-ingest-{}-{}-{}.log",
                template.key.vhost(),
                template.key.ingest(),
                channel
            )),
            None => null_device(),
        };
        let mode = match &template.engine {
            Some(profile) => EncodeMode::Transcode(profile.clone()),
            None => EncodeMode::Copy,
        };
        EncoderSpec::new(template.ffmpeg.clone(), input, output)
            .with_log_path(log_path)
            .with_mode(mode)
    }

    fn build_worker(
        &self,
        directives: &dyn DirectiveSource,
        template: &ProvisioningTemplate,
        channel: ChannelId,
        origin: WorkerOrigin,
        spec: EncoderSpec,
    ) -> Result<IngestWorker, IngestError> {
        let process = self
            .factory
            .create(spec)
            .map_err(|source| IngestError::AllocFailed {
                key: template.key.clone(),
                source,
            })?;
        let vhost = template.key.vhost();
        Ok(
            IngestWorker::new(template.key.clone(), channel, origin, process, directives.heartbeat_grace(vhost))
                .with_segment_dir(directives.segment_dir(vhost)),
        )
    }

    /// Collect matching workers, stop each, erase them, then drop the templates.
    async fn drop_matching(&self, state: &mut State, scope: DropScope<'_>) {
        let channels = state.registry.channels_matching(|k| scope.matches(k));

        for &channel in &channels {
            if let Some(worker) = state.registry.get_mut(channel) {
                if worker.stop().await {
                    self.publish_worker(EventKind::WorkerStopped, worker);
                }
            }
        }
        for channel in channels {
            if let Some(worker) = state.registry.take(channel) {
                self.bus
                    .publish(worker_event(EventKind::WorkerRemoved, &worker).with_reason("reload"));
            }
        }

        for key in state.registry.drop_templates(|k| scope.matches(k)) {
            self.bus
                .publish(Event::new(EventKind::TemplateDropped).with_identity(key.to_string()));
        }
    }

    fn publish_worker(&self, kind: EventKind, worker: &IngestWorker) {
        self.bus.publish(worker_event(kind, worker));
    }
}

/// Templates and workers affected by a reload removal.
#[derive(Clone, Copy)]
enum DropScope<'a> {
    Vhost(&'a str),
    Ingest(&'a TemplateKey),
}

impl DropScope<'_> {
    fn matches(self, key: &TemplateKey) -> bool {
        match self {
            DropScope::Vhost(vhost) => key.vhost() == vhost,
            DropScope::Ingest(ingest) => key == ingest,
        }
    }
}

fn worker_event(kind: EventKind, worker: &IngestWorker) -> Event {
    Event::new(kind)
        .with_channel(worker.channel().to_scalar())
        .with_identity(worker.uri())
}

/// Forwards bus events to the subscriber set until `stop`, then drains and
/// shuts the set down.
fn spawn_fanout(bus: &Bus, subs: SubscriberSet, stop: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event fan-out lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = stop.cancelled() => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            subs.emit(ev);
        }
        subs.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribers::Subscribe;
    use crate::directives::{DirectiveTree, VhostDirective};
    use crate::test_support::{FakeFactory, Probe, directive, init_tracing, live_tree};
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn supervisor(mode: ProvisioningMode) -> (Arc<Supervisor>, Arc<FakeFactory>) {
        init_tracing();
        let factory = FakeFactory::new();
        let cfg = SupervisorConfig {
            mode,
            handle_os_signals: false,
            ..SupervisorConfig::default()
        };
        let sup = Supervisor::builder(cfg)
            .with_process_factory(factory.clone())
            .with_directives(Arc::new(live_tree()))
            .build();
        (sup, factory)
    }

    async fn started(mode: ProvisioningMode) -> (Arc<Supervisor>, Arc<FakeFactory>) {
        let (sup, factory) = supervisor(mode);
        sup.start().await;
        (sup, factory)
    }

    fn cam1() -> TemplateKey {
        TemplateKey::new("live", "cam1")
    }

    fn rec() -> TemplateKey {
        TemplateKey::new("live", "rec")
    }

    fn source(channel: &str) -> RequestParams {
        RequestParams {
            username: "u".into(),
            password: "p".into(),
            ip: "10.0.0.7".into(),
            channel: channel.into(),
            ..RequestParams::default()
        }
    }

    fn ranged(channel: &str) -> RequestParams {
        RequestParams {
            starttime: Some("100".into()),
            endtime: Some("200".into()),
            ..source(channel)
        }
    }

    async fn next_of(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == kind {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn test_stream_add_reuses_worker_for_same_source() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;

        let first = sup.add(&cam1(), source("001")).await.unwrap();
        let second = sup.add(&cam1(), source("001")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.output_url, "rtmp://host/live/1");
        assert_eq!(factory.created(), 1);
        assert_eq!(sup.list().await.len(), 1);

        let spec = factory.spec(0);
        assert_eq!(spec.input, "rtsp://u:p@10.0.0.7/001");
        assert_eq!(spec.max_reconnects, Some(3));
        assert!(spec.input_params.is_empty());
        assert_eq!(spec.log_path, null_device());
    }

    #[tokio::test]
    async fn test_channels_distinct_across_classes() {
        let (sup, _) = started(ProvisioningMode::Dynamic).await;

        let a = sup.add(&cam1(), source("001")).await.unwrap();
        let b = sup.add(&cam1(), source("002")).await.unwrap();
        let c = sup.add(&rec(), ranged("001")).await.unwrap();

        assert_eq!(a.channel.to_scalar(), 1);
        assert_eq!(b.channel.to_scalar(), 2);
        assert_eq!(c.channel.to_scalar(), 65537);
        assert_eq!(c.output_url, "rtmp://host:1935/live/65537");

        let channels: Vec<ChannelId> = sup.list().await.iter().map(|s| s.channel).collect();
        assert_eq!(channels, vec![a.channel, b.channel, c.channel]);
    }

    #[tokio::test]
    async fn test_file_worker_erased_on_tick_after_deactivate() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        let mut rx = sup.bus().subscribe();

        let out = sup.add(&rec(), ranged("001")).await.unwrap();
        assert_eq!(factory.spec(0).input, "rtsp://10.0.0.7/001?start=100&end=200");
        assert_eq!(factory.spec(0).max_reconnects, Some(1));

        sup.activate(out.channel, None).await.unwrap();
        sup.tick().await.unwrap();
        assert_eq!(Probe::get(&factory.probe(0).starts), 1);

        sup.deactivate(out.channel).await.unwrap();
        assert!(!sup.is_serving(out.channel).await);
        assert_eq!(sup.list().await.len(), 1);

        sup.tick().await.unwrap();
        assert!(sup.list().await.is_empty());
        assert_eq!(Probe::get(&factory.probe(0).stops), 1);

        let ev = next_of(&mut rx, EventKind::WorkerRemoved).await;
        assert_eq!(ev.channel, Some(65537));
        assert_eq!(ev.reason.as_deref(), Some("pending"));
    }

    #[tokio::test]
    async fn test_heartbeat_grace_expiry() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        let out = sup.add(&cam1(), source("001")).await.unwrap();

        let fresh = SystemTime::now() - Duration::from_secs(179);
        sup.activate(out.channel, Some(fresh)).await.unwrap();
        sup.tick().await.unwrap();
        assert!(sup.list().await[0].active);
        assert!(sup.list().await[0].running);

        let stale = SystemTime::now() - Duration::from_secs(181);
        sup.activate(out.channel, Some(stale)).await.unwrap();
        sup.tick().await.unwrap();

        let snap = &sup.list().await[0];
        assert!(!snap.active);
        assert!(!snap.running);
        assert!(!snap.pending_removal);
        assert_eq!(Probe::get(&factory.probe(0).stops), 1);
    }

    #[tokio::test]
    async fn test_remove_only_accepts_tagged_channels() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        sup.add(&cam1(), source("001")).await.unwrap();
        let file = sup.add(&rec(), ranged("001")).await.unwrap();

        let err = sup.remove(1).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidChannel(1)));
        assert_eq!(sup.list().await.len(), 2);

        let err = sup.remove(65537 + 9).await.unwrap_err();
        assert!(matches!(err, IngestError::NoSuchChannel(_)));

        sup.activate(file.channel, None).await.unwrap();
        sup.tick().await.unwrap();
        sup.remove(file.channel.to_scalar()).await.unwrap();
        assert_eq!(sup.list().await.len(), 1);
        assert_eq!(Probe::get(&factory.probe(1).stops), 1);
    }

    #[tokio::test]
    async fn test_recompiling_identical_directive_keeps_one_template() {
        let (sup, _) = started(ProvisioningMode::Dynamic).await;
        let before = sup.state.lock().await.registry.template(&cam1()).cloned().unwrap();

        sup.on_reload(ReloadEvent::IngestAdded {
            vhost: "live".into(),
            ingest: "cam1".into(),
        })
        .await;

        assert_eq!(sup.templates().await, vec![cam1(), rec()]);
        let after = sup.state.lock().await.registry.template(&cam1()).cloned().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_deactivate_then_activate_keeps_channel() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        let out = sup.add(&cam1(), source("001")).await.unwrap();
        assert_eq!(out.output_url, "rtmp://host/live/1");

        sup.activate(out.channel, None).await.unwrap();
        sup.tick().await.unwrap();
        assert!(sup.list().await[0].active);

        sup.deactivate(out.channel).await.unwrap();
        assert!(!sup.list().await[0].active);
        assert!(sup.is_serving(out.channel).await);

        sup.activate(out.channel, None).await.unwrap();
        let snap = &sup.list().await[0];
        assert!(snap.active);
        assert_eq!(snap.channel, out.channel);
        assert_eq!(factory.created(), 1);
        assert_eq!(Probe::get(&factory.probe(0).resets), 1);
    }

    #[tokio::test]
    async fn test_add_rejections() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;

        let err = sup.add(&TemplateKey::new("live", "nope"), source("001")).await.unwrap_err();
        assert!(matches!(err, IngestError::NoSuchTemplate(_)));

        let mut half = source("001");
        half.starttime = Some("100".into());
        let err = sup.add(&rec(), half).await.unwrap_err();
        assert!(matches!(err, IngestError::TimeRangeRequired(_)));

        let err = sup.activate(ChannelId::new(SourceClass::Stream, 7).unwrap(), None).await.unwrap_err();
        assert!(matches!(err, IngestError::NoSuchChannel(_)));

        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_registry_unchanged() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        factory.fail_create.store(true, Ordering::SeqCst);

        let err = sup.add(&cam1(), source("001")).await.unwrap_err();
        assert_eq!(err.as_label(), "alloc_failed");
        assert!(sup.list().await.is_empty());

        factory.fail_create.store(false, Ordering::SeqCst);
        sup.add(&cam1(), source("001")).await.unwrap();
        assert_eq!(sup.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_tick_aborts_on_start_failure() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        let out = sup.add(&cam1(), source("001")).await.unwrap();
        sup.activate(out.channel, None).await.unwrap();
        factory.probe(0).fail_start.store(true, Ordering::SeqCst);
        let mut rx = sup.bus().subscribe();

        let err = sup.tick().await.unwrap_err();
        assert_eq!(err.as_label(), "process_start_failed");

        let ev = next_of(&mut rx, EventKind::TickFailed).await;
        assert_eq!(ev.channel, Some(1));
        assert_eq!(ev.identity.as_deref(), Some("live/cam1"));
        assert_eq!(sup.list().await.len(), 1);

        factory.probe(0).fail_start.store(false, Ordering::SeqCst);
        sup.tick().await.unwrap();
        assert!(sup.list().await[0].running);
    }

    #[tokio::test]
    async fn test_cycle_failure_aborts_pass_but_erases_deferred() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        let file = sup.add(&rec(), ranged("001")).await.unwrap();
        let stream = sup.add(&cam1(), source("001")).await.unwrap();
        sup.activate(file.channel, None).await.unwrap();
        sup.activate(stream.channel, None).await.unwrap();
        sup.tick().await.unwrap();

        sup.deactivate(file.channel).await.unwrap();
        let file_probe = factory.probe(0);
        let stream_probe = factory.probe(1);
        stream_probe.fail_cycle.store(true, Ordering::SeqCst);
        sup.state.lock().await.status = StatusReporter::new(Some(Duration::from_secs(10)));
        let mut rx = sup.bus().subscribe();

        let err = sup.tick().await.unwrap_err();
        assert_eq!(err.as_label(), "process_cycle_failed");
        let ev = next_of(&mut rx, EventKind::TickFailed).await;
        assert_eq!(ev.channel, Some(stream.channel.to_scalar()));
        assert!(sup.state.lock().await.status.can_emit(tokio::time::Instant::now()));

        // Iteration order is unspecified: the file worker is either stopped
        // and erased in this pass, or untouched.
        let stopped = Probe::get(&file_probe.stops) == 1;
        let present = sup.list().await.iter().any(|s| s.channel == file.channel);
        assert_eq!(present, !stopped);

        stream_probe.fail_cycle.store(false, Ordering::SeqCst);
        sup.tick().await.unwrap();
        let channels: Vec<ChannelId> = sup.list().await.iter().map(|s| s.channel).collect();
        assert_eq!(channels, vec![stream.channel]);
        assert_eq!(Probe::get(&file_probe.stops), 1);
        assert!(!sup.state.lock().await.status.can_emit(tokio::time::Instant::now()));
    }

    #[tokio::test]
    async fn test_exhausted_file_worker_deactivates_itself() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        let out = sup.add(&rec(), ranged("001")).await.unwrap();
        sup.activate(out.channel, None).await.unwrap();
        let probe = factory.probe(0);

        // Budget of one reconnect: initial start plus one restart.
        for _ in 0..2 {
            probe.exit_on_cycle.store(true, Ordering::SeqCst);
            sup.tick().await.unwrap();
        }
        assert_eq!(Probe::get(&probe.starts), 2);

        sup.tick().await.unwrap();
        assert!(sup.list().await[0].pending_removal);

        sup.tick().await.unwrap();
        assert!(sup.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_reload_removal_stops_and_erases() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        let out = sup.add(&cam1(), source("001")).await.unwrap();
        sup.activate(out.channel, None).await.unwrap();
        sup.tick().await.unwrap();

        sup.on_reload(ReloadEvent::IngestRemoved {
            vhost: "live".into(),
            ingest: "cam1".into(),
        })
        .await;

        assert!(sup.list().await.is_empty());
        assert_eq!(Probe::get(&factory.probe(0).stops), 1);
        assert_eq!(sup.templates().await, vec![rec()]);

        let err = sup.add(&cam1(), source("001")).await.unwrap_err();
        assert!(matches!(err, IngestError::NoSuchTemplate(_)));
    }

    #[tokio::test]
    async fn test_reload_update_with_broken_directive_drops_template() {
        let (sup, _) = started(ProvisioningMode::Dynamic).await;

        let mut tree = live_tree();
        tree.vhosts[0].ingests[0].input = None;
        sup.replace_directives(Arc::new(tree)).await;
        sup.on_reload(ReloadEvent::IngestUpdated {
            vhost: "live".into(),
            ingest: "cam1".into(),
        })
        .await;

        assert_eq!(sup.templates().await, vec![rec()]);
    }

    fn with_news_vhost() -> DirectiveTree {
        let mut tree = live_tree();
        tree.vhosts.push(VhostDirective {
            name: "news".into(),
            enabled: true,
            heartbeat_grace_secs: None,
            segment_dir: None,
            ingests: vec![
                directive("anchor", "stream", "rtsp://10.0.0.9/anchor", "rtmp://host/[vhost]/[channel]"),
                directive("desk", "stream", "rtsp://10.0.0.9/desk", "rtmp://host/[vhost]/[channel]"),
            ],
        });
        tree
    }

    #[tokio::test]
    async fn test_vhost_added_compiles_only_that_vhost() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        let before = sup.state.lock().await.registry.template(&cam1()).cloned().unwrap();

        sup.replace_directives(Arc::new(with_news_vhost())).await;
        sup.on_reload(ReloadEvent::VhostAdded { vhost: "news".into() }).await;

        assert_eq!(
            sup.templates().await,
            vec![
                cam1(),
                rec(),
                TemplateKey::new("news", "anchor"),
                TemplateKey::new("news", "desk"),
            ]
        );
        let after = sup.state.lock().await.registry.template(&cam1()).cloned().unwrap();
        assert_eq!(before, after);
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_vhost_added_materialises_static_workers() {
        let (sup, factory) = started(ProvisioningMode::Static).await;
        assert_eq!(factory.created(), 2);

        sup.replace_directives(Arc::new(with_news_vhost())).await;
        sup.on_reload(ReloadEvent::VhostAdded { vhost: "news".into() }).await;

        assert_eq!(factory.created(), 4);
        assert_eq!(sup.list().await.len(), 4);
        let news: Vec<EncoderSpec> = (2..4).map(|i| factory.spec(i)).collect();
        assert!(news.iter().all(|s| s.output.starts_with("rtmp://host/news/")));
        assert_eq!(news[0].input, "rtsp://10.0.0.9/anchor");
        assert_eq!(news[1].input, "rtsp://10.0.0.9/desk");
    }

    #[tokio::test]
    async fn test_reload_listener_applies_events() {
        let (sup, _) = started(ProvisioningMode::Dynamic).await;
        let (tx, rx) = mpsc::channel(4);
        let handle = sup.spawn_reload_listener(rx);

        tx.send(ReloadEvent::VhostRemoved { vhost: "live".into() }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(sup.templates().await.is_empty());
    }

    #[tokio::test]
    async fn test_static_mode_materialises_one_worker_per_template() {
        let (sup, factory) = started(ProvisioningMode::Static).await;

        assert_eq!(factory.created(), 2);
        let snaps = sup.list().await;
        assert!(snaps.iter().all(|s| s.active && s.channel.class() == SourceClass::Stream));

        let file = (0..2).map(|i| factory.spec(i)).find(|s| s.input.contains("start=")).unwrap();
        assert_eq!(file.input, "rtsp://[ip]/[channel]?start=[starttime]&end=[endtime]");
        assert_eq!(file.input_params, vec!["-re".to_string()]);
        assert_eq!(file.max_reconnects, None);
        assert!(file.output.starts_with("rtmp://host:1935/live/"));

        sup.on_reload(ReloadEvent::IngestAdded {
            vhost: "live".into(),
            ingest: "cam1".into(),
        })
        .await;
        assert_eq!(factory.created(), 2);
        assert_eq!(sup.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_fast_stops_then_stops() {
        let (sup, factory) = started(ProvisioningMode::Dynamic).await;
        let out = sup.add(&cam1(), source("001")).await.unwrap();
        sup.activate(out.channel, None).await.unwrap();
        sup.tick().await.unwrap();

        sup.shutdown().await;

        let probe = factory.probe(0);
        assert_eq!(Probe::get(&probe.fast_stops), 1);
        assert_eq!(Probe::get(&probe.stops), 1);
        assert!(sup.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_exits_on_stop() {
        let (sup, factory) = supervisor(ProvisioningMode::Static);
        let runner = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move { sup.run().await })
        };

        sup.stop();
        runner.await.unwrap();

        assert!(sup.list().await.is_empty());
        assert_eq!(factory.created(), 2);
    }

    #[derive(Default)]
    struct Recorder {
        seen: std::sync::Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn test_subscribers_see_lifecycle_through_shutdown() {
        let rec = Arc::new(Recorder::default());
        let sup = Supervisor::builder(SupervisorConfig {
            handle_os_signals: false,
            ..SupervisorConfig::default()
        })
        .with_process_factory(FakeFactory::new())
        .with_directives(Arc::new(live_tree()))
        .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
        .build();

        sup.start().await;
        sup.add(&cam1(), source("001")).await.unwrap();
        sup.shutdown().await;

        let seen = rec.seen.lock().unwrap().clone();
        assert!(seen.contains(&EventKind::TemplateCompiled));
        assert!(seen.contains(&EventKind::WorkerAdded));
        assert_eq!(seen.last(), Some(&EventKind::AllStopped));
    }
}
