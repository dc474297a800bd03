
use log::trace;
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::arena::{Arena, Index};
use crate::candidate::CandidateId;
use crate::candidate::candidate_pair::*;
use crate::transaction::TransactionHandle;
use shared::error::*;

pub type PairId = Index<CandidatePair>;

/// State of the checks for one component.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChecklistState {
    #[default]
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ChecklistState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a check, as far as the pair is concerned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Succeeded { mapped_address: SocketAddr },
    Failed,
}

/// The pairs of one component, kept sorted by descending pair priority.
///
/// All pair state changes go through here; a pair only ever moves forward
/// through Frozen, Waiting, InProgress and then Succeeded or Failed.
#[derive(Debug)]
pub struct Checklist {
    component: u16,
    state: ChecklistState,
    pairs: Arena<CandidatePair>,
    ordered: Vec<PairId>,
}

impl Checklist {
    pub fn new(component: u16) -> Self {
        Self {
            component,
            state: ChecklistState::Running,
            pairs: Arena::new(),
            ordered: vec![],
        }
    }

    pub fn component(&self) -> u16 {
        self.component
    }

    pub fn state(&self) -> ChecklistState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn get(&self, id: PairId) -> Option<&CandidatePair> {
        self.pairs.get(id)
    }

    /// Pairs in check order.
    pub fn iter(&self) -> impl Iterator<Item = (PairId, &CandidatePair)> {
        self.ordered
            .iter()
            .filter_map(|id| self.pairs.get(*id).map(|p| (*id, p)))
    }

    pub fn seed(&mut self, pairs: Vec<CandidatePair>) -> Vec<PairId> {
        let ids = pairs
            .into_iter()
            .map(|p| {
                let id = self.pairs.insert(p);
                self.ordered.push(id);
                id
            })
            .collect();
        self.sort();
        ids
    }

    pub fn add_pair(&mut self, pair: CandidatePair) -> PairId {
        let id = self.pairs.insert(pair);
        self.ordered.push(id);
        self.sort();
        id
    }

    /// Descending priority; ties go to the smaller local address, then the
    /// smaller remote address.
    fn sort(&mut self) {
        let pairs = &self.pairs;
        self.ordered.sort_by(|a, b| match (pairs.get(*a), pairs.get(*b)) {
            (Some(pa), Some(pb)) => pb
                .priority()
                .cmp(&pa.priority())
                .then_with(|| pa.local_addr.cmp(&pb.local_addr))
                .then_with(|| pa.remote_addr.cmp(&pb.remote_addr)),
            _ => std::cmp::Ordering::Equal,
        });
    }

    /// Removes pairs whose local base and remote candidate duplicate a
    /// higher priority pair. Only pairs that were never checked are removed.
    pub fn prune_redundant(&mut self) -> Vec<PairId> {
        let mut seen = HashSet::new();
        let mut removed = vec![];

        for id in self.ordered.clone() {
            let Some(p) = self.pairs.get(id) else {
                continue;
            };
            let key = (p.local_base, p.remote, p.transport_protocol);
            let untouched = matches!(
                p.state,
                CandidatePairState::Frozen | CandidatePairState::Waiting
            ) && p.transaction.is_none();

            if !seen.insert(key) && untouched {
                trace!("pruning redundant pair {p}");
                self.pairs.remove(id);
                removed.push(id);
            }
        }

        self.ordered.retain(|id| !removed.contains(id));
        removed
    }

    /// Moves the highest priority pair of every foundation not yet in
    /// `thawed` to Waiting. Called on the checklists in component order so
    /// each foundation starts on its lowest component.
    pub fn initial_thaw(&mut self, thawed: &mut HashSet<String>) {
        for id in &self.ordered {
            if let Some(p) = self.pairs.get_mut(*id) {
                if p.state == CandidatePairState::Frozen && thawed.insert(p.foundation.clone()) {
                    p.state = CandidatePairState::Waiting;
                }
            }
        }
    }

    pub fn next_waiting_pair(&self) -> Option<PairId> {
        self.first_in_state(CandidatePairState::Waiting)
    }

    pub fn next_frozen_pair(&self) -> Option<PairId> {
        self.first_in_state(CandidatePairState::Frozen)
    }

    fn first_in_state(&self, state: CandidatePairState) -> Option<PairId> {
        self.iter()
            .find(|(_, p)| p.state == state && p.transaction.is_none())
            .map(|(id, _)| id)
    }

    pub fn find_pair(&self, local: CandidateId, remote: CandidateId) -> Option<PairId> {
        self.iter()
            .find(|(_, p)| p.local == local && p.remote == remote)
            .map(|(id, _)| id)
    }

    pub fn find_by_transaction(&self, handle: TransactionHandle) -> Option<PairId> {
        self.iter()
            .find(|(_, p)| p.transaction.is_some_and(|t| t.handle == handle))
            .map(|(id, _)| id)
    }

    /// Applies a forward state transition. Going backwards is refused.
    pub fn set_state(&mut self, id: PairId, next: CandidatePairState) -> Result<()> {
        let p = self.pairs.get_mut(id).ok_or(Error::ErrPairNotExists)?;
        if !p.state.can_advance_to(next) {
            return Err(Error::ErrInvalidStateTransition(
                p.state.to_string(),
                next.to_string(),
            ));
        }
        p.state = next;
        Ok(())
    }

    /// Binds `transaction` to the pair. A connectivity check moves the pair
    /// to InProgress; nomination and keepalive checks need a Succeeded pair.
    pub fn start_check(&mut self, id: PairId, transaction: PairTransaction) -> Result<()> {
        let p = self.pairs.get_mut(id).ok_or(Error::ErrPairNotExists)?;
        if p.transaction.is_some() {
            return Err(Error::ErrPairTransactionInFlight);
        }

        let next = match transaction.kind {
            CheckKind::Connectivity => CandidatePairState::InProgress,
            CheckKind::Nomination | CheckKind::Keepalive => CandidatePairState::Succeeded,
        };
        if !p.state.can_advance_to(next) {
            return Err(Error::ErrInvalidStateTransition(
                p.state.to_string(),
                next.to_string(),
            ));
        }

        p.state = next;
        p.transaction = Some(transaction);
        Ok(())
    }

    /// Records the outcome of the transaction bound to the pair and detaches
    /// it. Outcomes for any other transaction are ignored.
    pub fn mark_result(
        &mut self,
        id: PairId,
        handle: TransactionHandle,
        outcome: CheckOutcome,
    ) -> Option<PairTransaction> {
        let p = self.pairs.get_mut(id)?;
        let transaction = p.transaction.filter(|t| t.handle == handle)?;
        p.transaction = None;

        match (transaction.kind, outcome) {
            (CheckKind::Connectivity, CheckOutcome::Succeeded { mapped_address }) => {
                p.state = CandidatePairState::Succeeded;
                p.mapped_address = Some(mapped_address);
            }
            (CheckKind::Connectivity, CheckOutcome::Failed) => {
                p.state = CandidatePairState::Failed;
            }
            (CheckKind::Nomination, CheckOutcome::Succeeded { .. }) => {
                p.nominated = true;
            }
            (CheckKind::Nomination, CheckOutcome::Failed) => {
                p.nomination_failed = true;
            }
            (CheckKind::Keepalive, _) => {}
        }

        Some(transaction)
    }

    /// Detaches the pair's transaction without touching its state.
    pub fn detach(&mut self, id: PairId) -> Option<PairTransaction> {
        self.pairs.get_mut(id).and_then(|p| p.transaction.take())
    }

    /// Detaches every transaction. Pairs that were InProgress end up Failed.
    pub fn detach_all(&mut self) -> Vec<PairTransaction> {
        let mut detached = vec![];
        for (_, p) in self.pairs.iter_mut() {
            if let Some(t) = p.transaction.take() {
                detached.push(t);
            }
            if p.state == CandidatePairState::InProgress {
                p.state = CandidatePairState::Failed;
            }
        }
        detached
    }

    /// Fails an InProgress pair whose check could not be restarted.
    pub fn abandon(&mut self, id: PairId) {
        if let Some(p) = self.pairs.get_mut(id) {
            if p.state == CandidatePairState::InProgress && p.transaction.is_none() {
                trace!("abandoning pair {p}");
                p.state = CandidatePairState::Failed;
            }
        }
    }

    /// Frozen pairs of the foundation become Waiting. Returns how many.
    pub fn unfreeze_foundation(&mut self, foundation: &str) -> usize {
        let mut n = 0;
        for (_, p) in self.pairs.iter_mut() {
            if p.state == CandidatePairState::Frozen && p.foundation == foundation {
                p.state = CandidatePairState::Waiting;
                n += 1;
            }
        }
        n
    }

    /// After a failure, the next Frozen pair of the same foundation becomes
    /// Waiting so the foundation keeps making progress.
    pub fn unfreeze_next(&mut self, foundation: &str) -> Option<PairId> {
        let id = self
            .iter()
            .find(|(_, p)| p.state == CandidatePairState::Frozen && p.foundation == foundation)
            .map(|(id, _)| id)?;
        if let Some(p) = self.pairs.get_mut(id) {
            p.state = CandidatePairState::Waiting;
        }
        Some(id)
    }

    /// Fails every InProgress pair ranked below `id` and returns their
    /// detached transactions so the caller can cancel them.
    pub fn cancel_lower_in_progress(&mut self, id: PairId) -> Vec<PairTransaction> {
        match self.pairs.get(id).map(|p| p.priority()) {
            Some(priority) => self.cancel_in_progress(|p| p.priority() < priority),
            None => vec![],
        }
    }

    /// Fails every InProgress pair, for a checklist that needs no more checks.
    pub fn cancel_all_in_progress(&mut self) -> Vec<PairTransaction> {
        self.cancel_in_progress(|_| true)
    }

    fn cancel_in_progress(&mut self, select: impl Fn(&CandidatePair) -> bool) -> Vec<PairTransaction> {
        let mut cancelled = vec![];
        for (_, p) in self.pairs.iter_mut() {
            if p.state == CandidatePairState::InProgress && select(p) {
                if let Some(t) = p.transaction.take() {
                    cancelled.push(t);
                }
                p.state = CandidatePairState::Failed;
            }
        }
        cancelled
    }

    /// Re-derives pair priorities for a role change and re-sorts.
    pub fn recompute_priorities(&mut self, controlling: bool) {
        for (_, p) in self.pairs.iter_mut() {
            p.ice_role_controlling = controlling;
        }
        self.sort();
    }

    pub fn set_use_candidate_received(&mut self, id: PairId) {
        if let Some(p) = self.pairs.get_mut(id) {
            p.use_candidate_received = true;
        }
    }

    pub fn nominate(&mut self, id: PairId) -> bool {
        match self.pairs.get_mut(id) {
            Some(p) if p.is_valid() => {
                p.nominated = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn stats_mut(&mut self, id: PairId) -> Option<&mut crate::stats::CandidatePairStats> {
        self.pairs.get_mut(id).map(|p| &mut p.stats)
    }

    pub fn nominated_pair(&self) -> Option<PairId> {
        self.iter().find(|(_, p)| p.nominated).map(|(id, _)| id)
    }

    /// Highest pair that can still end up nominated.
    pub fn best_available_pair(&self) -> Option<PairId> {
        self.iter()
            .find(|(_, p)| p.state != CandidatePairState::Failed && !p.nomination_failed)
            .map(|(id, _)| id)
    }

    pub fn best_valid_pair(&self) -> Option<PairId> {
        self.iter().find(|(_, p)| p.is_valid()).map(|(id, _)| id)
    }

    /// Whether any pair is still waiting for or running a check.
    pub fn has_pending_checks(&self) -> bool {
        self.iter().any(|(_, p)| {
            p.transaction.is_some()
                || matches!(
                    p.state,
                    CandidatePairState::Frozen
                        | CandidatePairState::Waiting
                        | CandidatePairState::InProgress
                )
        })
    }

    /// Completed once a pair is nominated; Failed when no pair is left that
    /// could still be nominated, unless `may_fail` is false because more
    /// pairs can still be added. Failed is final.
    pub fn update_state(&mut self, may_fail: bool) -> ChecklistState {
        if self.state == ChecklistState::Failed {
            return self.state;
        }
        self.state = if self.nominated_pair().is_some() {
            ChecklistState::Completed
        } else if may_fail
            && self.iter().all(|(_, p)| {
                p.state == CandidatePairState::Failed
                    || (p.state == CandidatePairState::Succeeded && p.nomination_failed)
            })
        {
            ChecklistState::Failed
        } else {
            ChecklistState::Running
        };
        self.state
    }

    /// Gives up on the component regardless of its pairs.
    pub fn fail(&mut self) {
        self.state = ChecklistState::Failed;
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
        self.ordered.clear();
    }
}
