#[cfg(test)]
mod scheduler_test;

use std::time::{Duration, Instant};

use crate::checklist::{Checklist, ChecklistState, PairId};

/// Paced check scheduler. One check is started per Ta interval across all
/// checklists, visiting the running checklists round-robin.
#[derive(Debug)]
pub struct CheckScheduler {
    ta: Duration,
    cursor: usize,
    next_tick: Option<Instant>,
    last_tick: Option<Instant>,
}

impl CheckScheduler {
    pub fn new(ta: Duration) -> Self {
        Self {
            ta,
            cursor: 0,
            next_tick: None,
            last_tick: None,
        }
    }

    pub fn ta(&self) -> Duration {
        self.ta
    }

    /// Changes the interval. An armed tick is moved so it fires no later
    /// than one new interval from the last tick.
    pub fn set_ta(&mut self, ta: Duration) {
        if let Some(next) = self.next_tick {
            let last = next.checked_sub(self.ta).unwrap_or(next);
            self.next_tick = Some(next.min(last + ta));
        }
        self.ta = ta;
    }

    /// Arms the first tick to fire at `now`.
    pub fn start(&mut self, now: Instant) {
        self.next_tick = Some(now);
    }

    pub fn stop(&mut self) {
        self.next_tick = None;
    }

    /// Re-arms a stopped scheduler. The tick after a pause still keeps one
    /// interval from the last tick.
    pub fn resume(&mut self, now: Instant) {
        if self.next_tick.is_none() {
            let at = self.last_tick.map_or(now, |last| (last + self.ta).max(now));
            self.next_tick = Some(at);
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Whether a tick is due at `now`. When it is, the next tick is armed
    /// one interval later.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.next_tick {
            Some(at) if at <= now => {
                self.next_tick = Some(now + self.ta);
                self.last_tick = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Picks the pair to check on this tick: the highest priority Waiting
    /// pair of the next running checklist in round-robin order. When no
    /// checklist has a Waiting pair, the highest Frozen pair is taken the
    /// same way.
    pub fn next_check(&mut self, checklists: &[Checklist]) -> Option<(usize, PairId)> {
        self.pick(checklists, Checklist::next_waiting_pair)
            .or_else(|| self.pick(checklists, Checklist::next_frozen_pair))
    }

    fn pick(
        &mut self,
        checklists: &[Checklist],
        select: fn(&Checklist) -> Option<PairId>,
    ) -> Option<(usize, PairId)> {
        let n = checklists.len();
        for i in 0..n {
            let at = (self.cursor + i) % n;
            let cl = &checklists[at];
            if cl.state() != ChecklistState::Running {
                continue;
            }
            if let Some(id) = select(cl) {
                self.cursor = (at + 1) % n;
                return Some((at, id));
            }
        }
        None
    }
}
