use std::time::Instant;

use super::{Session, SessionTimer};
use crate::candidate::candidate_pair::CheckKind;
use crate::checklist::{ChecklistState, PairId};
use crate::session::session_config::NominationMode;
use crate::state::SessionState;

pub(crate) trait ControllingSelector {
    /// Regular nomination: once the best pair that can still succeed is
    /// valid, a USE-CANDIDATE check is sent over it.
    fn maybe_nominate(&mut self, ci: usize, now: Instant);
}

pub(crate) trait ControlledSelector {
    fn handle_use_candidate(&mut self, ci: usize, pair_id: PairId);
    /// Arms the nomination deadline once our own checks are done.
    fn check_nomination_wait(&mut self, now: Instant);
}

impl ControllingSelector for Session {
    fn maybe_nominate(&mut self, ci: usize, now: Instant) {
        if !self.role.is_controlling()
            || self.nomination != NominationMode::Regular
            || self.state != SessionState::Running
        {
            return;
        }

        let candidate = {
            let cl = &self.checklists[ci];
            if cl.state() != ChecklistState::Running || cl.nominated_pair().is_some() {
                return;
            }
            let nominating = cl.iter().any(|(_, p)| {
                p.transaction()
                    .is_some_and(|t| t.kind == CheckKind::Nomination)
            });
            if nominating {
                return;
            }

            cl.best_available_pair().filter(|&id| {
                cl.get(id)
                    .is_some_and(|p| p.is_valid() && p.transaction().is_none())
            })
        };

        if let Some(pair_id) = candidate {
            log::debug!(
                "[{}]: nominating pair on component {}",
                self.get_name(),
                self.checklists[ci].component()
            );
            if let Err(err) = self.start_check(ci, pair_id, CheckKind::Nomination, now) {
                log::warn!("[{}]: failed to nominate: {}", self.get_name(), err);
            }
        }
    }
}

impl ControlledSelector for Session {
    fn handle_use_candidate(&mut self, ci: usize, pair_id: PairId) {
        let valid = self.checklists[ci]
            .get(pair_id)
            .is_some_and(|p| p.is_valid());
        if valid {
            self.nominate(ci, pair_id);
        } else {
            // Nominated once our own check over the pair succeeds.
            self.checklists[ci].set_use_candidate_received(pair_id);
        }
    }

    fn check_nomination_wait(&mut self, now: Instant) {
        let checking = self.trickling
            || self
                .checklists
                .iter()
                .filter(|cl| cl.state() == ChecklistState::Running)
                .any(|cl| cl.has_pending_checks());

        if checking {
            self.disarm(SessionTimer::NominationWait);
        } else if !self.armed.contains_key(&SessionTimer::NominationWait) {
            log::debug!(
                "[{}]: checks done, waiting for nomination",
                self.get_name()
            );
            self.arm(
                SessionTimer::NominationWait,
                now + self.nomination_wait_timeout,
            );
        }
    }
}
