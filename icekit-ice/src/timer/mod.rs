#[cfg(test)]
mod timer_test;

use std::time::Instant;

use crate::arena::{Arena, Index};

/// One scheduled entry of a [`TimerQueue`].
pub struct Timer<K> {
    deadline: Instant,
    seq: u64,
    key: K,
}

/// Handle returned by [`TimerQueue::schedule`]; cancelling or firing a timer
/// invalidates it.
pub type TimerHandle<K> = Index<Timer<K>>;

/// Deadline-ordered set of keyed timers, driven by the caller's clock.
///
/// Nothing fires on its own: the owner asks for the next deadline with
/// `poll_timeout` and collects due entries with `pop_expired`.
pub struct TimerQueue<K> {
    timers: Arena<Timer<K>>,
    seq: u64,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self {
            timers: Arena::new(),
            seq: 0,
        }
    }
}

impl<K> TimerQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Instant, key: K) -> TimerHandle<K> {
        self.seq += 1;
        self.timers.insert(Timer {
            deadline,
            seq: self.seq,
            key,
        })
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle<K>) -> bool {
        self.timers.remove(handle).is_some()
    }

    pub fn contains(&self, handle: TimerHandle<K>) -> bool {
        self.timers.contains(handle)
    }

    pub fn deadline(&self, handle: TimerHandle<K>) -> Option<Instant> {
        self.timers.get(handle).map(|t| t.deadline)
    }

    /// Earliest pending deadline.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.timers.iter().map(|(_, t)| t.deadline).min()
    }

    /// Removes and returns the earliest timer due at `now`. Ties fire in
    /// scheduling order.
    pub fn pop_expired(&mut self, now: Instant) -> Option<K> {
        let handle = self
            .timers
            .iter()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| (t.deadline, t.seq))
            .map(|(h, _)| h)?;

        self.timers.remove(handle).map(|t| t.key)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
