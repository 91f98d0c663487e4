//! # Throttled status line.
//!
//! At most once per interval the tick samples one worker uniformly at random
//! and logs its identity and uptime. Inactive samples are skipped without
//! consuming the interval. Purely observational.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::info;

use crate::worker::IngestWorker;

pub(crate) struct StatusReporter {
    every: Option<Duration>,
    started: Instant,
    last: Option<Instant>,
}

impl StatusReporter {
    /// `None` disables the status line.
    pub(crate) fn new(every: Option<Duration>) -> Self {
        Self {
            every,
            started: Instant::now(),
            last: None,
        }
    }

    /// True if a line may be emitted at `now`.
    pub(crate) fn can_emit(&self, now: Instant) -> bool {
        match (self.every, self.last) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(every), Some(last)) => now.duration_since(last) >= every,
        }
    }

    /// Time since the reporter was created.
    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.started)
    }

    /// Marks a line as emitted at `now`.
    pub(crate) fn elapse(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Picks one active worker if a line is due; marks the interval consumed.
    pub(crate) fn sample<'a, I>(&mut self, now: Instant, workers: I) -> Option<&'a IngestWorker>
    where
        I: ExactSizeIterator<Item = &'a IngestWorker>,
    {
        if !self.can_emit(now) || workers.len() == 0 {
            return None;
        }
        let index = rand::rng().random_range(0..workers.len());
        let picked = workers.into_iter().nth(index)?;
        if !picked.is_active() {
            return None;
        }
        self.elapse(now);
        Some(picked)
    }

    /// Samples and logs.
    pub(crate) fn report<'a, I>(&mut self, workers: I)
    where
        I: ExactSizeIterator<Item = &'a IngestWorker>,
    {
        let now = Instant::now();
        let total = workers.len();
        let elapsed = self.age(now);
        if let Some(w) = self.sample(now, workers) {
            info!(
                elapsed_ms = elapsed.as_millis() as u64,
                workers = total,
                channel = %w.channel(),
                uri = %w.uri(),
                uptime_ms = w.alive().as_millis() as u64,
                output = %w.descriptor().output_url,
                "ingest status"
            );
        }
    }
}
