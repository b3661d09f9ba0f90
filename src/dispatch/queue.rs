//! Pending operation queue
//!
//! Ordered by enqueue sequence within a priority class. Every
//! `aging_interval` an entry waits promotes it by one class, so a steady
//! stream of urgent work can delay background work but never starve it.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use super::operation::OperationPriority;
use crate::domain::OperationId;

#[derive(Debug, Clone)]
struct PendingEntry {
    operation: OperationId,
    priority: OperationPriority,
    enqueued_at: DateTime<Utc>,
}

/// Pending operations keyed by their enqueue sequence
pub struct PendingQueue {
    entries: BTreeMap<u64, PendingEntry>,
    sequence_counter: u64,
    aging_interval: Duration,
    max_size: usize,
    enqueued_count: u64,
    dequeued_count: u64,
    requeued_count: u64,
}

impl PendingQueue {
    pub fn new(max_size: usize, aging_interval_secs: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            sequence_counter: 0,
            aging_interval: crate::config::secs(aging_interval_secs.max(1)),
            max_size,
            enqueued_count: 0,
            dequeued_count: 0,
            requeued_count: 0,
        }
    }

    /// Append an operation, returning its sequence number
    pub fn enqueue(
        &mut self,
        operation: OperationId,
        priority: OperationPriority,
        now: DateTime<Utc>,
    ) -> Result<u64, String> {
        if self.entries.len() >= self.max_size {
            return Err(format!("queue is full ({} pending)", self.entries.len()));
        }

        let sequence = self.sequence_counter;
        self.sequence_counter += 1;

        self.entries.insert(
            sequence,
            PendingEntry {
                operation,
                priority,
                enqueued_at: now,
            },
        );
        self.enqueued_count += 1;
        debug!("Enqueued operation {} as #{}", operation, sequence);

        Ok(sequence)
    }

    /// Put an operation back at its original position.
    ///
    /// Bypasses the size limit: the operation was already admitted once.
    pub fn requeue(
        &mut self,
        sequence: u64,
        operation: OperationId,
        priority: OperationPriority,
        enqueued_at: DateTime<Utc>,
    ) {
        self.entries.insert(
            sequence,
            PendingEntry {
                operation,
                priority,
                enqueued_at,
            },
        );
        self.requeued_count += 1;
    }

    /// Remove and return the next operation to hand out
    pub fn dequeue(&mut self, now: DateTime<Utc>) -> Option<(u64, OperationId)> {
        let (sequence, _) = self
            .entries
            .iter()
            .min_by_key(|(sequence, entry)| (self.effective_rank(entry, now), **sequence))?;
        let sequence = *sequence;

        let entry = self.entries.remove(&sequence)?;
        self.dequeued_count += 1;
        Some((sequence, entry.operation))
    }

    fn effective_rank(&self, entry: &PendingEntry, now: DateTime<Utc>) -> u64 {
        let waited = now.signed_duration_since(entry.enqueued_at);
        let promotions = if waited > Duration::zero() {
            (waited.num_milliseconds() / self.aging_interval.num_milliseconds()).max(0) as u64
        } else {
            0
        };
        entry.priority.rank().saturating_sub(promotions)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            current_size: self.entries.len(),
            max_size: self.max_size,
            enqueued_total: self.enqueued_count,
            dequeued_total: self.dequeued_count,
            requeued_total: self.requeued_count,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub current_size: usize,
    pub max_size: usize,
    pub enqueued_total: u64,
    pub dequeued_total: u64,
    pub requeued_total: u64,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Queue[{}/{}, enq={}, deq={}, req={}]",
            self.current_size,
            self.max_size,
            self.enqueued_total,
            self.dequeued_total,
            self.requeued_total
        )
    }
}
