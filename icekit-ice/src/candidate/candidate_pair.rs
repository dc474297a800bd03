use serde::Serialize;
use shared::TransportProtocol;
use std::fmt;
use std::net::SocketAddr;

use super::{Candidate, CandidateId, CandidateType};
use crate::state::Role;
use crate::stats::CandidatePairStats;
use crate::transaction::TransactionHandle;

/// Represent the ICE candidate pair check state.
///
/// States only move forward: Frozen < Waiting < InProgress < {Succeeded, Failed}.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CandidatePairState {
    /// Means a check has not been performed and is blocked on its foundation.
    #[default]
    #[serde(rename = "frozen")]
    Frozen,

    /// Means a check has not been performed for this pair.
    #[serde(rename = "waiting")]
    Waiting,

    /// Means a check has been sent for this pair, but the transaction is in progress.
    #[serde(rename = "in-progress")]
    InProgress,

    /// Means a check for this pair was already done and produced a successful result.
    #[serde(rename = "succeeded")]
    Succeeded,

    /// Means a check for this pair was already done and failed, either never producing any response
    /// or producing an unrecoverable failure response.
    #[serde(rename = "failed")]
    Failed,
}

impl CandidatePairState {
    fn rank(self) -> u8 {
        match self {
            Self::Frozen => 0,
            Self::Waiting => 1,
            Self::InProgress => 2,
            Self::Succeeded | Self::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    /// Whether moving to `next` respects the check state order.
    pub fn can_advance_to(self, next: CandidatePairState) -> bool {
        self == next || (!self.is_terminal() && next.rank() > self.rank())
    }
}

impl fmt::Display for CandidatePairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Frozen => "frozen",
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };

        write!(f, "{s}")
    }
}

/// What a transaction bound to a pair is checking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckKind {
    /// The ordinary connectivity check that moves the pair out of InProgress.
    Connectivity,
    /// A USE-CANDIDATE check on an already succeeded pair.
    Nomination,
    /// Periodic check on the nominated pair once the session completed.
    Keepalive,
}

/// The single transaction a pair may have in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairTransaction {
    pub handle: TransactionHandle,
    pub kind: CheckKind,
    /// Role announced in the request, compared against the current role when a
    /// 487 comes back.
    pub sent_role: Role,
    pub use_candidate: bool,
}

/// Represents a combination of a local and remote candidate.
#[derive(Clone, Debug)]
pub struct CandidatePair {
    pub(crate) component: u16,
    pub(crate) local: CandidateId,
    pub(crate) remote: CandidateId,
    pub(crate) local_priority: u32,
    pub(crate) remote_priority: u32,
    pub(crate) local_type: CandidateType,
    pub(crate) remote_type: CandidateType,
    pub(crate) local_addr: SocketAddr,
    pub(crate) local_base: SocketAddr,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) transport_protocol: TransportProtocol,
    pub(crate) foundation: String,
    pub(crate) ice_role_controlling: bool,

    pub(crate) state: CandidatePairState,
    pub(crate) nominated: bool,
    /// The controlling peer sent USE-CANDIDATE before our own check succeeded.
    pub(crate) use_candidate_received: bool,
    /// A nomination over this pair failed; it can no longer be nominated.
    pub(crate) nomination_failed: bool,
    pub(crate) transaction: Option<PairTransaction>,
    /// XOR-MAPPED-ADDRESS from the successful check.
    pub(crate) mapped_address: Option<SocketAddr>,
    pub(crate) stats: CandidatePairStats,
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prio {} (local, prio {}) {} {} <-> {} {} (remote, prio {}) {}",
            self.priority(),
            self.local_priority,
            self.local_type,
            self.local_addr,
            self.remote_type,
            self.remote_addr,
            self.remote_priority,
            self.state,
        )
    }
}

impl PartialEq for CandidatePair {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.remote == other.remote
    }
}

impl CandidatePair {
    #[must_use]
    pub fn new(
        local_id: CandidateId,
        local: &Candidate,
        remote_id: CandidateId,
        remote: &Candidate,
        ice_role_controlling: bool,
    ) -> Self {
        Self {
            component: local.component(),
            local: local_id,
            remote: remote_id,
            local_priority: local.priority(),
            remote_priority: remote.priority(),
            local_type: local.candidate_type(),
            remote_type: remote.candidate_type(),
            local_addr: local.addr(),
            local_base: local.base(),
            remote_addr: remote.addr(),
            transport_protocol: local.transport_protocol(),
            foundation: format!("{}{}", local.foundation(), remote.foundation()),
            ice_role_controlling,
            state: CandidatePairState::Frozen,
            nominated: false,
            use_candidate_received: false,
            nomination_failed: false,
            transaction: None,
            mapped_address: None,
            stats: CandidatePairStats::default(),
        }
    }

    /// RFC 8445 - 6.1.2.3.  Computing Pair Priority and Ordering Pairs
    /// Let G be the priority for the candidate provided by the controlling
    /// agent.  Let D be the priority for the candidate provided by the
    /// controlled agent.
    /// pair priority = 2^32*MIN(G,D) + 2*MAX(G,D) + (G>D?1:0)
    pub fn priority(&self) -> u64 {
        let (g, d) = if self.ice_role_controlling {
            (self.local_priority, self.remote_priority)
        } else {
            (self.remote_priority, self.local_priority)
        };

        // Can exceed 64 bits only for out-of-range signalled priorities.
        let p = (u128::from(g.min(d)) << 32) + 2 * u128::from(g.max(d)) + u128::from(g > d);
        u64::try_from(p).unwrap_or(u64::MAX)
    }

    pub fn component(&self) -> u16 {
        self.component
    }

    pub fn local(&self) -> CandidateId {
        self.local
    }

    pub fn remote(&self) -> CandidateId {
        self.remote
    }

    pub fn local_base(&self) -> SocketAddr {
        self.local_base
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn foundation(&self) -> &str {
        &self.foundation
    }

    pub fn state(&self) -> CandidatePairState {
        self.state
    }

    pub fn nominated(&self) -> bool {
        self.nominated
    }

    pub fn transaction(&self) -> Option<PairTransaction> {
        self.transaction
    }

    pub fn stats(&self) -> &CandidatePairStats {
        &self.stats
    }

    /// Succeeded and still eligible for nomination.
    pub fn is_valid(&self) -> bool {
        self.state == CandidatePairState::Succeeded && !self.nomination_failed
    }

    pub fn info(&self) -> CandidatePairInfo {
        CandidatePairInfo {
            component: self.component,
            local_type: self.local_type,
            local_addr: self.local_addr,
            remote_type: self.remote_type,
            remote_addr: self.remote_addr,
            priority: self.priority(),
            state: self.state,
            nominated: self.nominated,
            mapped_address: self.mapped_address,
            stats: self.stats.clone(),
        }
    }
}

/// Snapshot of a pair handed to the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePairInfo {
    pub component: u16,
    pub local_type: CandidateType,
    pub local_addr: SocketAddr,
    pub remote_type: CandidateType,
    pub remote_addr: SocketAddr,
    pub priority: u64,
    pub state: CandidatePairState,
    pub nominated: bool,
    pub mapped_address: Option<SocketAddr>,
    pub stats: CandidatePairStats,
}
