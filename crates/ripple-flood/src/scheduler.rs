//! One-shot forwarding timers
//!
//! The scheduler is a deadline queue. Arming a timer returns a
//! [`TimerHandle`] that the broadcast record owns; dropping the handle
//! cancels the timer, so a fire is never delivered for a record that was
//! evicted or already decided. Cancelled entries are skipped lazily when
//! they reach the head of the queue.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use crate::error::ScheduleError;

/// Owned handle to an armed timer
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    token: u64,
    fire_at: Instant,
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Unique token identifying this arming
    pub fn token(&self) -> u64 {
        self.token
    }

    /// When the timer fires
    pub fn fire_at(&self) -> Instant {
        self.fire_at
    }

    /// Cancel explicitly (same as dropping)
    pub fn cancel(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancelled.store(true, AtomicOrdering::Release);
    }
}

/// A timer that came due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub sequence: u32,
    pub token: u64,
    pub fire_at: Instant,
}

#[derive(Debug)]
struct TimerEntry {
    fire_at: Instant,
    token: u64,
    sequence: u32,
    cancelled: Arc<AtomicBool>,
}

impl TimerEntry {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Acquire)
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.token == other.token
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Earlier deadline first, then arming order
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.token.cmp(&other.token))
    }
}

/// Deadline queue for forwarding timers
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<TimerEntry>>,
    next_token: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `sequence` at `now + delay`
    pub fn arm(
        &mut self,
        sequence: u32,
        now: Instant,
        delay: Duration,
    ) -> Result<TimerHandle, ScheduleError> {
        let fire_at = now
            .checked_add(delay)
            .ok_or(ScheduleError::DeadlineOverflow { sequence })?;

        let token = self.next_token;
        self.next_token += 1;

        let cancelled = Arc::new(AtomicBool::new(false));
        self.queue.push(Reverse(TimerEntry {
            fire_at,
            token,
            sequence,
            cancelled: Arc::clone(&cancelled),
        }));

        Ok(TimerHandle {
            token,
            fire_at,
            cancelled,
        })
    }

    /// Pop the next timer due at or before `now`
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerFired> {
        self.discard_cancelled();
        let due = self
            .queue
            .peek()
            .is_some_and(|Reverse(entry)| entry.fire_at <= now);
        if !due {
            return None;
        }

        self.queue.pop().map(|Reverse(entry)| TimerFired {
            sequence: entry.sequence,
            token: entry.token,
            fire_at: entry.fire_at,
        })
    }

    /// Earliest pending deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_cancelled();
        self.queue.peek().map(|Reverse(entry)| entry.fire_at)
    }

    /// Number of armed, uncancelled timers
    pub fn live_timers(&self) -> usize {
        self.queue
            .iter()
            .filter(|Reverse(entry)| !entry.is_cancelled())
            .count()
    }

    /// Forget every queued timer
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    fn discard_cancelled(&mut self) {
        while self
            .queue
            .peek()
            .is_some_and(|Reverse(entry)| entry.is_cancelled())
        {
            self.queue.pop();
        }
    }
}
