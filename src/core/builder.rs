use std::sync::Arc;

use crate::{
    config::SupervisorConfig,
    directives::{DirectiveSource, DirectiveTree},
    events::Bus,
    process::{FfmpegFactory, ProcessFactory},
    subscribers::{Subscribe, SubscriberSet},
};

use super::supervisor::Supervisor;

/// Builder for a [`Supervisor`].
///
/// Defaults: no subscribers, an empty [`DirectiveTree`] and an
/// [`FfmpegFactory`] using `cfg.stop_timeout`.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    factory: Option<Arc<dyn ProcessFactory>>,
    directives: Option<Arc<dyn DirectiveSource>>,
}

impl SupervisorBuilder {
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            factory: None,
            directives: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Each one gets a dedicated worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the encoder process factory.
    pub fn with_process_factory(mut self, factory: Arc<dyn ProcessFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sets the directive source compiled on [`Supervisor::start`].
    pub fn with_directives(mut self, directives: Arc<dyn DirectiveSource>) -> Self {
        self.directives = Some(directives);
        self
    }

    /// Builds the supervisor and spawns its event fan-out task.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());

        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(FfmpegFactory::new(self.cfg.stop_timeout)));
        let directives = self
            .directives
            .unwrap_or_else(|| Arc::new(DirectiveTree::default()));

        Arc::new(Supervisor::new_internal(self.cfg, bus, subs, factory, directives))
    }
}
