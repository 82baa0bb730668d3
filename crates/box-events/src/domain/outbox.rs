//! # Outbox
//!
//! Post-commit side effects. Each committed event enqueues one entry per
//! After step; entries are drained outside the creating transaction, retried
//! up to `max_attempts` and then parked as dead letters for manual replay.
//! At most `dead_letter_capacity` dead letters are kept; the oldest go first.

use parking_lot::Mutex;
use shared_types::Event;
use std::collections::VecDeque;
use tracing::warn;
use uuid::Uuid;

use super::message::Message;

/// A post-commit side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AfterStep {
    /// Push the formatted event to every member channel.
    SendRealtimeUpdate,
    /// Bump unread and digest counters of other members.
    CountActivity,
    /// Drop the members set and the sender's box list.
    InvalidateCaches,
    /// Apply the message size delta to the box quota.
    ComputeUsedSpace,
    /// Notify the kicked identity.
    NotifyKick,
    /// Delete the blob of a deleted file message once nothing uses it.
    DeleteOrphanFile,
}

impl AfterStep {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AfterStep::SendRealtimeUpdate => "send_realtime_update",
            AfterStep::CountActivity => "count_activity",
            AfterStep::InvalidateCaches => "invalidate_caches",
            AfterStep::ComputeUsedSpace => "compute_used_space",
            AfterStep::NotifyKick => "notify_kick",
            AfterStep::DeleteOrphanFile => "delete_orphan_file",
        }
    }
}

impl std::fmt::Display for AfterStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data a Do step hands over to its After steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Metadata {
    #[default]
    None,
    /// Aggregate of the message the event created or modified.
    Message(Message),
}

impl Metadata {
    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        match self {
            Metadata::Message(msg) => Some(msg),
            Metadata::None => None,
        }
    }
}

/// One pending side effect.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub event: Event,
    pub metadata: Metadata,
    pub step: AfterStep,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl DrainReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.retried == 0 && self.dead_lettered == 0
    }
}

/// Where a failed entry went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retry,
    DeadLettered,
}

/// In-process outbox queue.
#[derive(Debug)]
pub struct Outbox {
    pending: Mutex<VecDeque<OutboxEntry>>,
    dead: Mutex<VecDeque<OutboxEntry>>,
    max_attempts: u32,
    dead_letter_capacity: usize,
}

impl Outbox {
    #[must_use]
    pub fn new(max_attempts: u32, dead_letter_capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            dead: Mutex::new(VecDeque::new()),
            max_attempts: max_attempts.max(1),
            dead_letter_capacity: dead_letter_capacity.max(1),
        }
    }

    /// Enqueue one entry per step, preserving step order.
    pub fn enqueue(&self, event: &Event, metadata: &Metadata, steps: &[AfterStep]) -> usize {
        let mut pending = self.pending.lock();
        for step in steps {
            pending.push_back(OutboxEntry {
                id: Uuid::new_v4(),
                event: event.clone(),
                metadata: metadata.clone(),
                step: *step,
                attempts: 0,
                last_error: None,
            });
        }
        steps.len()
    }

    /// Take everything currently pending.
    pub fn take_pending(&self) -> Vec<OutboxEntry> {
        self.pending.lock().drain(..).collect()
    }

    /// Record a failed attempt and requeue or park the entry.
    pub fn record_failure(&self, mut entry: OutboxEntry, error: String) -> FailureOutcome {
        entry.attempts += 1;
        entry.last_error = Some(error);
        if entry.attempts >= self.max_attempts {
            let mut dead = self.dead.lock();
            if dead.len() >= self.dead_letter_capacity {
                if let Some(dropped) = dead.pop_front() {
                    warn!(
                        entry_id = %dropped.id,
                        event_id = %dropped.event.id,
                        step = %dropped.step,
                        "Dead letters full, dropping oldest"
                    );
                }
            }
            dead.push_back(entry);
            FailureOutcome::DeadLettered
        } else {
            self.pending.lock().push_back(entry);
            FailureOutcome::Retry
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Snapshot of the dead letters.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<OutboxEntry> {
        self.dead.lock().iter().cloned().collect()
    }

    /// Move every dead letter back to pending with a fresh attempt budget.
    pub fn requeue_dead_letters(&self) -> usize {
        let dead: Vec<OutboxEntry> = self.dead.lock().drain(..).collect();
        let count = dead.len();
        let mut pending = self.pending.lock();
        for mut entry in dead {
            entry.attempts = 0;
            pending.push_back(entry);
        }
        count
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
