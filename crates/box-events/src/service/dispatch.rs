//! # Outbox Dispatch
//!
//! Drains the outbox through the After steps. A failure is counted and
//! logged with its box, event and step, then retried on a later drain or
//! parked as a dead letter and announced on the dead-letter channel.

use serde_json::json;
use shared_bus::{RealtimeUpdate, DLQ_CHANNEL};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use box_telemetry::{log_step_event, metric_inc, AFTER_STEP_FAILURES, DEAD_LETTERS};

use super::BoxEventsService;
use crate::domain::outbox::{DrainReport, FailureOutcome, OutboxEntry};
use crate::handlers::{after::run_after, AfterContext};
use crate::ports::outbound::CacheService;

impl BoxEventsService {
    /// Run every pending After step once.
    pub async fn drain_outbox(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let pending = self.outbox.take_pending();
        if pending.is_empty() {
            return report;
        }

        let mapper = self.mapper();
        let ctx = AfterContext {
            store: self.deps.store.as_ref(),
            cache: self.deps.cache.as_ref(),
            mapper: &mapper,
            files: self.deps.files.as_ref(),
            quota: self.deps.quota.as_ref(),
            settings: self.deps.settings.as_ref(),
        };

        for entry in pending {
            match run_after(&ctx, entry.step, &entry.event, &entry.metadata).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    metric_inc!(AFTER_STEP_FAILURES, &[entry.step.as_str()]);
                    log_step_event!(
                        warn,
                        "After step failed",
                        entry.event.box_id,
                        entry.event.id,
                        entry.step,
                        attempt = entry.attempts + 1,
                        error = %e
                    );
                    let dead = entry.clone();
                    match self.outbox.record_failure(entry, e.to_string()) {
                        FailureOutcome::Retry => report.retried += 1,
                        FailureOutcome::DeadLettered => {
                            report.dead_lettered += 1;
                            self.announce_dead_letter(&dead, &e.to_string()).await;
                        }
                    }
                }
            }
        }
        report
    }

    async fn announce_dead_letter(&self, entry: &OutboxEntry, error: &str) {
        metric_inc!(DEAD_LETTERS);
        let object = json!({
            "entry_id": entry.id,
            "box_id": entry.event.box_id,
            "event_id": entry.event.id,
            "event_type": entry.event.event_type,
            "step": entry.step.as_str(),
            "error": error,
        });
        let update = RealtimeUpdate::new(DLQ_CHANNEL, entry.step.as_str(), object);
        if let Err(e) = self.deps.cache.publish(update).await {
            error!(box_id = %entry.event.box_id, event_id = %entry.event.id, step = %entry.step, error = %e, "Could not announce dead letter");
        }
    }

    /// Side effects that exhausted their attempts.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<OutboxEntry> {
        self.outbox.dead_letters()
    }

    /// Give every dead letter a fresh attempt budget and drain.
    pub async fn replay_dead_letters(&self) -> DrainReport {
        let requeued = self.outbox.requeue_dead_letters();
        info!(requeued, "Replaying dead letters");
        self.drain_outbox().await
    }

    /// Number of side effects waiting for a drain.
    #[must_use]
    pub fn pending_side_effects(&self) -> usize {
        self.outbox.pending_len()
    }

    /// Drain the outbox every `outbox_drain_interval` until `shutdown` fires.
    ///
    /// Requests already drain their own side effects; the worker picks up
    /// the retries.
    pub fn spawn_outbox_worker(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.config.outbox_drain_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Outbox worker stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let report = service.drain_outbox().await;
                        if !report.is_clean() {
                            info!(
                                succeeded = report.succeeded,
                                retried = report.retried,
                                dead_lettered = report.dead_lettered,
                                "Outbox drained with failures"
                            );
                        }
                    }
                }
            }
        })
    }
}
