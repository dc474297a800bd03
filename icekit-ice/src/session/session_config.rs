use std::time::Duration;

use super::*;

/// Initial retransmission timeout of a check transaction (RFC 5389 Section 7.2.1).
pub(crate) const DEFAULT_INITIAL_RTO: Duration = Duration::from_millis(500);

/// Number of transmissions of a check request before it times out.
pub(crate) const DEFAULT_MAX_TRANSMISSIONS: u32 = 7;

/// Rm, the multiple of the initial RTO waited after the last transmission.
pub(crate) const DEFAULT_FINAL_TIMEOUT_MULTIPLIER: u32 = 16;

/// Lower bound of Ta.
pub(crate) const DEFAULT_MIN_CHECK_INTERVAL: Duration = Duration::from_millis(20);

/// Ta budget shared by all active checklists.
pub(crate) const DEFAULT_CHECK_INTERVAL_BUDGET: Duration = Duration::from_millis(500);

/// The interval used to keep nominated pairs alive.
pub(crate) const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// How long a controlled agent with finished checks waits for a nomination.
pub(crate) const DEFAULT_NOMINATION_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// TURN permissions last 300 seconds; refresh them well before.
pub(crate) const DEFAULT_PERMISSION_REFRESH_INTERVAL: Duration = Duration::from_secs(240);

/// Upper bound of checks remembered before checks start.
pub(crate) const DEFAULT_MAX_EARLY_CHECKS: usize = 32;

/// How long a trickling session waits for the remote end-of-candidates.
pub(crate) const DEFAULT_END_OF_CANDIDATES_TIMEOUT: Duration = Duration::from_secs(40);

/// How the controlling agent nominates.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum NominationMode {
    /// Check first, then nominate the best valid pair with a second check
    /// carrying USE-CANDIDATE.
    #[default]
    Regular,
    /// Every check carries USE-CANDIDATE, so each success nominates.
    Aggressive,
}

/// Collects the arguments to `ice::Session` construction into a single structure, for
/// future-proofness of the interface.
#[derive(Default, Debug, Clone)]
pub struct SessionConfig {
    pub role: Role,

    /// Component ids, each in 1..=256. Defaults to a single RTP component.
    pub components: Vec<u16>,

    /// It is used to perform connectivity checks. The values MUST be unguessable, with at least
    /// 128 bits of random number generator output used to generate the password, and at least 24
    /// bits of output to generate the username fragment.
    pub local_ufrag: String,
    /// See `local_ufrag`.
    pub local_pwd: String,

    /// Random when none.
    pub tie_breaker: Option<u64>,

    pub nomination: NominationMode,

    /// Defaults to 500 milliseconds when none.
    pub initial_rto: Option<Duration>,
    /// Ceiling of the doubling RTO. No ceiling when none.
    pub max_rto: Option<Duration>,
    /// Defaults to 7 when none.
    pub max_transmissions: Option<u32>,
    /// Defaults to 16 when none.
    pub final_timeout_multiplier: Option<u32>,

    /// Defaults to 20 milliseconds when none.
    pub min_check_interval: Option<Duration>,
    /// Defaults to 500 milliseconds when none.
    pub check_interval_budget: Option<Duration>,

    /// Determines how often keepalives are sent over nominated pairs once the session
    /// completed. Defaults to 15 seconds when none.
    pub keepalive_interval: Option<Duration>,

    /// Defaults to 10 seconds when none.
    pub nomination_wait_timeout: Option<Duration>,

    /// Defaults to 240 seconds when none.
    pub permission_refresh_interval: Option<Duration>,

    /// Defaults to 32 when none.
    pub max_early_checks: Option<usize>,

    /// Accept remote candidates after checks started, until end-of-candidates.
    pub trickle: bool,
    /// Trickling ends by itself after this long. Defaults to 40 seconds when none.
    pub end_of_candidates_timeout: Option<Duration>,
}

impl SessionConfig {
    pub(crate) fn pacing(&self) -> Pacing {
        Pacing {
            initial_rto: self.initial_rto.unwrap_or(DEFAULT_INITIAL_RTO),
            max_rto: self.max_rto,
            max_transmissions: self
                .max_transmissions
                .unwrap_or(DEFAULT_MAX_TRANSMISSIONS)
                .max(1),
            final_timeout_multiplier: self
                .final_timeout_multiplier
                .unwrap_or(DEFAULT_FINAL_TIMEOUT_MULTIPLIER),
            min_check_interval: self
                .min_check_interval
                .unwrap_or(DEFAULT_MIN_CHECK_INTERVAL),
            check_interval_budget: self
                .check_interval_budget
                .unwrap_or(DEFAULT_CHECK_INTERVAL_BUDGET),
        }
    }

    /// Component ids to create checklists for, validated and sorted.
    pub(crate) fn component_ids(&self) -> Result<Vec<u16>> {
        if self.components.is_empty() {
            return Ok(vec![COMPONENT_RTP]);
        }

        let mut ids = self.components.clone();
        ids.sort_unstable();
        for w in ids.windows(2) {
            if w[0] == w[1] {
                return Err(Error::ErrInvalidComponent(w[0]));
            }
        }
        if let Some(&bad) = ids.iter().find(|&&c| c == 0 || c > 256) {
            return Err(Error::ErrInvalidComponent(bad));
        }
        Ok(ids)
    }
}
