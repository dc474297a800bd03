#[cfg(test)]
mod timing_test;

use std::time::Duration;

/// The retransmission and check-pacing policy in one place, as pure
/// functions of the attempt number and the number of active checklists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub initial_rto: Duration,
    pub max_rto: Option<Duration>,
    pub max_transmissions: u32,
    pub final_timeout_multiplier: u32,
    pub min_check_interval: Duration,
    pub check_interval_budget: Duration,
}

impl Pacing {
    /// How long to wait after the given transmission (0-based) before
    /// retransmitting, or before giving up once the last one was sent.
    ///
    /// RFC 5389 Section 7.2.1: the RTO doubles after each retransmit, and the
    /// client waits Rm * RTO after the last request.
    pub fn retransmit_timeout(&self, transmission: u32) -> Duration {
        if transmission + 1 >= self.max_transmissions {
            return self
                .initial_rto
                .saturating_mul(self.final_timeout_multiplier);
        }

        let backoff = self
            .initial_rto
            .saturating_mul(1u32.checked_shl(transmission).unwrap_or(u32::MAX));
        match self.max_rto {
            Some(max_rto) => backoff.min(max_rto),
            None => backoff,
        }
    }

    /// Total lifetime of a transaction that never sees a response.
    pub fn transaction_timeout(&self) -> Duration {
        (0..self.max_transmissions.max(1))
            .map(|n| self.retransmit_timeout(n))
            .sum()
    }

    /// Ta, the interval between two paced checks.
    pub fn check_interval(&self, active_checklists: usize) -> Duration {
        let active = active_checklists.clamp(1, u32::MAX as usize) as u32;
        (self.check_interval_budget / active).max(self.min_check_interval)
    }
}
