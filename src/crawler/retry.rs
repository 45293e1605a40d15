//! Retry policy and the queue of pages waiting for another attempt

use crate::config::RetryConfig;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::time::Instant;

/// Every retry knob of a run in one place
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries per page after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Consecutive session-acquisition failures that abort the run
    pub session_failure_limit: u32,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            session_failure_limit: config.session_failure_limit.max(1),
        }
    }

    /// Backoff before retry number `retry` (1-based)
    ///
    /// `min(base * multiplier^(retry - 1), max)`
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let max = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= max {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Returns true if a page that has made `attempts` attempts may try again
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }
}

struct Slot<T> {
    ready_at: Instant,
    seq: u64,
    item: T,
}

// Min-heap on (ready_at, seq): earliest deadline first, FIFO among equals
impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl<T> Eq for Slot<T> {}

/// Deadline-ordered queue of pages to retry
pub struct RetryQueue<T> {
    heap: BinaryHeap<Slot<T>>,
    next_seq: u64,
}

impl<T> Default for RetryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RetryQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, item: T, ready_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Slot {
            ready_at,
            seq,
            item,
        });
    }

    /// Takes the earliest item whose deadline is at or before `now`
    pub fn pop_ready(&mut self, now: Instant) -> Option<T> {
        if self.heap.peek()?.ready_at <= now {
            self.heap.pop().map(|slot| slot.item)
        } else {
            None
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|slot| slot.ready_at)
    }

    /// Removes every pending item, earliest deadline first
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some(slot) = self.heap.pop() {
            items.push(slot.item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
