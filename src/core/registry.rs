//! # Worker and template registry.
//!
//! Plain data: the worker map, the template map and the channel allocator.
//! The supervisor keeps one [`Registry`] behind a single async mutex, so every
//! method here runs with exclusive access.
//!
//! ## Rules
//! - A channel maps to at most one worker; the allocator probes this map.
//! - Templates are replaced wholesale on recompilation (last write wins).
//! - Bulk removal is collect-then-erase: callers gather ids first, release the
//!   processes, then call [`Registry::take`].

use std::collections::HashMap;

use crate::channel::{ChannelAllocator, ChannelId};
use crate::error::IngestError;
use crate::templates::{ProvisioningTemplate, SourceClass, TemplateKey};
use crate::worker::{IngestWorker, WorkerOrigin};

#[derive(Default)]
pub(crate) struct Registry {
    workers: HashMap<ChannelId, IngestWorker>,
    templates: HashMap<TemplateKey, ProvisioningTemplate>,
    allocator: ChannelAllocator,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a template. Returns true if one was replaced.
    pub(crate) fn upsert_template(&mut self, template: ProvisioningTemplate) -> bool {
        self.templates
            .insert(template.key.clone(), template)
            .is_some()
    }

    pub(crate) fn template(&self, key: &TemplateKey) -> Option<&ProvisioningTemplate> {
        self.templates.get(key)
    }

    /// Drops every template whose key matches and returns the dropped keys.
    pub(crate) fn drop_templates(&mut self, matches: impl Fn(&TemplateKey) -> bool) -> Vec<TemplateKey> {
        let keys: Vec<TemplateKey> = self.templates.keys().filter(|k| matches(k)).cloned().collect();
        for key in &keys {
            self.templates.remove(key);
        }
        keys
    }

    pub(crate) fn template_keys(&self) -> Vec<TemplateKey> {
        let mut keys: Vec<TemplateKey> = self.templates.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Issues a channel id not held by any registered worker.
    pub(crate) fn allocate(&mut self, class: SourceClass) -> Result<ChannelId, IngestError> {
        let workers = &self.workers;
        self.allocator.allocate(class, |id| workers.contains_key(id))
    }

    pub(crate) fn insert(&mut self, worker: IngestWorker) {
        self.workers.insert(worker.channel(), worker);
    }

    pub(crate) fn get(&self, channel: ChannelId) -> Option<&IngestWorker> {
        self.workers.get(&channel)
    }

    pub(crate) fn get_mut(&mut self, channel: ChannelId) -> Option<&mut IngestWorker> {
        self.workers.get_mut(&channel)
    }

    pub(crate) fn take(&mut self, channel: ChannelId) -> Option<IngestWorker> {
        self.workers.remove(&channel)
    }

    /// Live Stream worker created for the same source tuple, if any.
    pub(crate) fn find_source(&self, key: &TemplateKey, ip: &str, channel: &str) -> Option<&IngestWorker> {
        self.workers.values().find(|w| w.serves_source(key, ip, channel))
    }

    pub(crate) fn has_static(&self, key: &TemplateKey) -> bool {
        self.workers
            .values()
            .any(|w| w.key() == key && *w.origin() == WorkerOrigin::Static)
    }

    /// Channels of workers whose template key matches.
    pub(crate) fn channels_matching(&self, matches: impl Fn(&TemplateKey) -> bool) -> Vec<ChannelId> {
        self.workers
            .values()
            .filter(|w| matches(w.key()))
            .map(IngestWorker::channel)
            .collect()
    }

    pub(crate) fn workers(&self) -> impl ExactSizeIterator<Item = &IngestWorker> {
        self.workers.values()
    }

    pub(crate) fn workers_mut(&mut self) -> impl Iterator<Item = &mut IngestWorker> {
        self.workers.values_mut()
    }

    /// Removes every worker; callers stop them first.
    pub(crate) fn clear_workers(&mut self) -> usize {
        let n = self.workers.len();
        self.workers.clear();
        n
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }
}
