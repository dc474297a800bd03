
pub mod session_config;
mod session_proto;
mod session_selector;

use bytes::BytesMut;
use log::{debug, error, info, trace, warn};
use session_config::*;
use session_selector::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use stun::attributes::*;
use stun::error_code::*;
use stun::fingerprint::*;
use stun::integrity::*;
use stun::message::*;
use stun::textattrs::*;
use stun::xoraddr::*;

use crate::arena::Arena;
use crate::attributes::{control::*, priority::*, use_candidate::*};
use crate::candidate::{candidate_pair::*, candidate_peer_reflexive::*, *};
use crate::checklist::*;
use crate::rand::*;
use crate::scheduler::CheckScheduler;
use crate::state::*;
use crate::timer::{TimerHandle, TimerQueue};
use crate::timing::Pacing;
use crate::transaction::*;
use shared::error::*;
use shared::{TaggedBytesMut, TransportContext, TransportMessage};

/// Events produced by the session, drained with `poll_event`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StateChanged(SessionState),
    PairNominated {
        component: u16,
        pair: CandidatePairInfo,
    },
    RoleChanged(Role),
    /// A keepalive over the nominated pair got no answer.
    KeepaliveFailed {
        component: u16,
    },
    /// A keepalive succeeded again after a failure.
    ConnectivityRestored {
        component: u16,
    },
    /// TURN control: the relayed candidate needs a permission for `peer`.
    CreatePermission {
        component: u16,
        relayed: SocketAddr,
        peer: SocketAddr,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) enum SessionTimer {
    Keepalive(u16),
    NominationWait,
    PermissionRefresh(u16),
    EndOfCandidates,
}

#[derive(Default)]
pub(crate) struct UfragPwd {
    pub(crate) local_ufrag: String,
    pub(crate) local_pwd: String,
    pub(crate) remote_ufrag: String,
    pub(crate) remote_pwd: String,
}

/// An authenticated check that arrived before checks started.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EarlyCheck {
    pub(crate) local: CandidateId,
    pub(crate) transport: TransportContext,
    pub(crate) priority: u32,
    pub(crate) use_candidate: bool,
}

fn assert_inbound_username(m: &Message, local_ufrag: &str, remote_ufrag: &str) -> Result<()> {
    let username = TextAttribute::get_from_as(m, ATTR_USERNAME)?;

    let matches = if remote_ufrag.is_empty() {
        username
            .text
            .strip_prefix(local_ufrag)
            .is_some_and(|rest| rest.starts_with(':'))
    } else {
        username.text.len() == local_ufrag.len() + 1 + remote_ufrag.len()
            && username.text.starts_with(local_ufrag)
            && username.text.ends_with(remote_ufrag)
            && username.text.as_bytes()[local_ufrag.len()] == b':'
    };

    if !matches {
        return Err(Error::Other(format!(
            "{:?} expected({}:{}) actual({})",
            Error::ErrMismatchUsername,
            local_ufrag,
            remote_ufrag,
            username,
        )));
    }

    Ok(())
}

fn assert_inbound_message_integrity(m: &Message, key: &str) -> Result<()> {
    MessageIntegrity::new_short_term_integrity(key.to_owned()).check(m)?;
    if m.contains(ATTR_FINGERPRINT) {
        FINGERPRINT.check(m)?;
    }
    Ok(())
}

/// Represents one ICE session: the checklists of all components, the paced
/// scheduler, the check transactions and the nominated pairs.
///
/// The session is sans-io. Datagrams go in through `handle_read` and come
/// out of `poll_write`; time only moves through `handle_timeout`.
pub struct Session {
    pub(crate) role: Role,
    pub(crate) tie_breaker: u64,
    pub(crate) nomination: NominationMode,
    pub(crate) ufrag_pwd: UfragPwd,

    pub(crate) pacing: Pacing,
    pub(crate) keepalive_interval: Duration,
    pub(crate) nomination_wait_timeout: Duration,
    pub(crate) permission_refresh_interval: Duration,
    pub(crate) max_early_checks: usize,
    pub(crate) end_of_candidates_timeout: Duration,

    pub(crate) trickle: bool,
    pub(crate) trickling: bool,
    pub(crate) state: SessionState,
    pub(crate) started: bool,
    pub(crate) closed: bool,

    pub(crate) candidates: Arena<Candidate>,
    pub(crate) local_candidates: Vec<CandidateId>,
    pub(crate) remote_candidates: Vec<CandidateId>,
    pub(crate) checklists: Vec<Checklist>,

    pub(crate) scheduler: CheckScheduler,
    pub(crate) engine: TransactionEngine,
    pub(crate) timers: TimerQueue<SessionTimer>,
    pub(crate) armed: HashMap<SessionTimer, TimerHandle<SessionTimer>>,

    pub(crate) early_checks: VecDeque<EarlyCheck>,
    pub(crate) permissions: HashSet<(SocketAddr, SocketAddr)>,
    pub(crate) keepalive_failed: HashSet<u16>,

    pub(crate) transmits: VecDeque<TaggedBytesMut>,
    pub(crate) events: VecDeque<Event>,
}

impl Session {
    /// Creates a new Session.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let components = config.component_ids()?;
        let pacing = config.pacing();

        let local_ufrag = if config.local_ufrag.is_empty() {
            generate_ufrag()
        } else {
            config.local_ufrag.clone()
        };
        let local_pwd = if config.local_pwd.is_empty() {
            generate_pwd()
        } else {
            config.local_pwd.clone()
        };

        Ok(Self {
            role: config.role,
            tie_breaker: config.tie_breaker.unwrap_or_else(rand::random::<u64>),
            nomination: config.nomination,
            ufrag_pwd: UfragPwd {
                local_ufrag,
                local_pwd,
                ..Default::default()
            },

            pacing,
            keepalive_interval: config
                .keepalive_interval
                .unwrap_or(DEFAULT_KEEPALIVE_INTERVAL),
            nomination_wait_timeout: config
                .nomination_wait_timeout
                .unwrap_or(DEFAULT_NOMINATION_WAIT_TIMEOUT),
            permission_refresh_interval: config
                .permission_refresh_interval
                .unwrap_or(DEFAULT_PERMISSION_REFRESH_INTERVAL),
            max_early_checks: config.max_early_checks.unwrap_or(DEFAULT_MAX_EARLY_CHECKS),
            end_of_candidates_timeout: config
                .end_of_candidates_timeout
                .unwrap_or(DEFAULT_END_OF_CANDIDATES_TIMEOUT),

            trickle: config.trickle,
            trickling: config.trickle,
            state: SessionState::Running,
            started: false,
            closed: false,

            candidates: Arena::new(),
            local_candidates: vec![],
            remote_candidates: vec![],
            checklists: components.into_iter().map(Checklist::new).collect(),

            scheduler: CheckScheduler::new(pacing.check_interval(1)),
            engine: TransactionEngine::new(pacing),
            timers: TimerQueue::new(),
            armed: HashMap::new(),

            early_checks: VecDeque::new(),
            permissions: HashSet::new(),
            keepalive_failed: HashSet::new(),

            transmits: VecDeque::new(),
            events: VecDeque::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tie_breaker(&self) -> u64 {
        self.tie_breaker
    }

    /// Returns the local user credentials.
    pub fn get_local_user_credentials(&self) -> (String, String) {
        (
            self.ufrag_pwd.local_ufrag.clone(),
            self.ufrag_pwd.local_pwd.clone(),
        )
    }

    /// Sets the credentials of the remote agent.
    pub fn set_remote_credentials(
        &mut self,
        remote_ufrag: String,
        remote_pwd: String,
    ) -> Result<()> {
        if remote_ufrag.is_empty() {
            return Err(Error::ErrRemoteUfragEmpty);
        } else if remote_pwd.is_empty() {
            return Err(Error::ErrRemotePwdEmpty);
        }

        self.ufrag_pwd.remote_ufrag = remote_ufrag;
        self.ufrag_pwd.remote_pwd = remote_pwd;
        Ok(())
    }

    /// Hands the candidates of one component to the session and pairs them.
    /// Candidates are paired when they share transport and address family.
    pub fn set_candidates(
        &mut self,
        component: u16,
        local: Vec<Candidate>,
        remote: Vec<Candidate>,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::ErrSessionClosed);
        }
        if self.started {
            return Err(self.contract_violation(Error::ErrCandidatesAfterStart));
        }

        let ci = self
            .checklist_index(component)
            .ok_or(Error::ErrUnknownComponent(component))?;
        if let Some(c) = local
            .iter()
            .chain(remote.iter())
            .find(|c| c.component() != component)
        {
            return Err(Error::ErrComponentMismatch(c.component(), component));
        }

        let local_ids: Vec<CandidateId> = local
            .into_iter()
            .map(|c| {
                let id = self.candidates.insert(c);
                self.local_candidates.push(id);
                id
            })
            .collect();
        let remote_ids: Vec<CandidateId> = remote
            .into_iter()
            .map(|c| {
                let id = self.candidates.insert(c);
                self.remote_candidates.push(id);
                id
            })
            .collect();

        let pairs = self.pair_candidates(&local_ids, &remote_ids);
        self.checklists[ci].seed(pairs);
        let pruned = self.checklists[ci].prune_redundant();
        debug!(
            "[{}]: component {}: {} pairs, {} pruned",
            self.get_name(),
            component,
            self.checklists[ci].len(),
            pruned.len()
        );

        Ok(())
    }

    /// Adds trickled remote candidates of one component and pairs them with
    /// the local candidates already known. Returns how many pairs were added.
    ///
    /// Once checks run, a new pair starts Waiting when its foundation already
    /// succeeded somewhere, or when no other pair of the foundation is queued
    /// and none sits on a lower component or ranks higher. Updates that come
    /// after end-of-candidates are ignored.
    pub fn add_remote_candidates(
        &mut self,
        component: u16,
        remote: Vec<Candidate>,
        now: Instant,
    ) -> Result<usize> {
        if self.closed {
            return Err(Error::ErrSessionClosed);
        }
        if self.started && !self.trickle {
            return Err(self.contract_violation(Error::ErrCandidatesAfterStart));
        }
        if self.started && !self.trickling {
            debug!(
                "[{}]: ignored remote candidate update, trickling has ended",
                self.get_name()
            );
            return Ok(0);
        }

        let ci = self
            .checklist_index(component)
            .ok_or(Error::ErrUnknownComponent(component))?;
        if let Some(c) = remote.iter().find(|c| c.component() != component) {
            return Err(Error::ErrComponentMismatch(c.component(), component));
        }

        let mut remote_ids = vec![];
        for c in remote {
            let known = self.remote_candidates.iter().any(|&id| {
                self.candidates
                    .get(id)
                    .is_some_and(|r| r.component() == component && r.equal(&c))
            });
            if known {
                trace!("[{}]: remote candidate {} already known", self.get_name(), c);
                continue;
            }
            debug!("[{}]: adding remote candidate {}", self.get_name(), c);
            let id = self.candidates.insert(c);
            self.remote_candidates.push(id);
            remote_ids.push(id);
        }

        let local_ids: Vec<CandidateId> = self
            .local_candidates
            .iter()
            .copied()
            .filter(|&id| {
                self.candidates.get(id).is_some_and(|c| {
                    c.component() == component
                        && c.candidate_type() != CandidateType::PeerReflexive
                })
            })
            .collect();
        let pairs = self.pair_candidates(&local_ids, &remote_ids);
        let added = self.checklists[ci].seed(pairs);

        if self.started {
            for &pair_id in &added {
                if self.trickled_pair_thaws(ci, pair_id) {
                    if let Err(err) =
                        self.checklists[ci].set_state(pair_id, CandidatePairState::Waiting)
                    {
                        warn!("[{}]: failed to thaw trickled pair: {}", self.get_name(), err);
                    }
                }
            }
        }
        let pruned = self.checklists[ci].prune_redundant();
        let count = added.iter().filter(|&id| !pruned.contains(id)).count();
        debug!(
            "[{}]: component {}: {} trickled pairs, {} pruned",
            self.get_name(),
            component,
            count,
            added.len() - count
        );

        self.update_session_state(now);
        Ok(count)
    }

    /// The remote agent has sent all its candidates. From now on a component
    /// whose pairs all failed fails the session.
    pub fn end_of_candidates(&mut self, now: Instant) -> Result<()> {
        if self.closed {
            return Err(Error::ErrSessionClosed);
        }
        if self.trickling {
            info!("[{}]: remote end-of-candidates", self.get_name());
            self.trickling = false;
            self.disarm(SessionTimer::EndOfCandidates);
            self.update_session_state(now);
        }
        Ok(())
    }

    /// Starts the paced connectivity checks. The first check goes out
    /// right away.
    pub fn start_checks(&mut self, now: Instant) -> Result<()> {
        if self.closed {
            return Err(Error::ErrSessionClosed);
        }
        if self.started {
            return Err(self.contract_violation(Error::ErrMultipleStart));
        }
        if self.ufrag_pwd.remote_ufrag.is_empty() {
            return Err(Error::ErrRemoteUfragEmpty);
        }
        if self.ufrag_pwd.remote_pwd.is_empty() {
            return Err(Error::ErrRemotePwdEmpty);
        }

        self.started = true;
        info!(
            "[{}]: starting checks for {} components, tie-breaker {}",
            self.get_name(),
            self.checklists.len(),
            self.tie_breaker
        );

        let mut thawed = HashSet::new();
        for cl in &mut self.checklists {
            cl.initial_thaw(&mut thawed);
        }
        self.scheduler.start(now);
        if self.trickling {
            self.arm(SessionTimer::EndOfCandidates, now + self.end_of_candidates_timeout);
        }

        while let Some(early) = self.early_checks.pop_front() {
            trace!(
                "[{}]: processing early check from {}",
                self.get_name(),
                early.transport.peer_addr
            );
            self.on_check_request(early, now);
        }

        self.update_session_state(now);
        if self.scheduler.tick(now) {
            self.on_tick(now);
        }

        Ok(())
    }

    /// Reports a datagram the caller failed to send. The transaction keeps
    /// its retransmission budget.
    pub fn handle_transmit_error(&mut self, transmit: &TaggedBytesMut, err: &Error) {
        warn!(
            "[{}]: failed to send to {}: {}",
            self.get_name(),
            transmit.transport.peer_addr,
            err
        );

        for cl in &mut self.checklists {
            let found = cl
                .iter()
                .find(|(_, p)| {
                    p.local_base() == transmit.transport.local_addr
                        && p.remote_addr() == transmit.transport.peer_addr
                })
                .map(|(id, _)| id);
            if let Some(stats) = found.and_then(|id| cl.stats_mut(id)) {
                stats.on_transport_error();
                return;
            }
        }
    }

    /// Timers armed right now, including transaction retransmissions and
    /// the pacing tick.
    pub fn pending_timers(&self) -> usize {
        self.timers.len() + self.engine.pending_timers() + usize::from(self.scheduler.is_running())
    }

    pub fn checklist(&self, component: u16) -> Option<&Checklist> {
        self.checklist_index(component).map(|i| &self.checklists[i])
    }

    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.get(id)
    }

    /// Snapshot of every pair of the component, in check order.
    pub fn pairs(&self, component: u16) -> Vec<CandidatePairInfo> {
        self.checklist(component)
            .map(|cl| cl.iter().map(|(_, p)| p.info()).collect())
            .unwrap_or_default()
    }

    pub fn nominated_pair(&self, component: u16) -> Option<CandidatePairInfo> {
        let cl = self.checklist(component)?;
        cl.nominated_pair().and_then(|id| cl.get(id)).map(|p| p.info())
    }

    pub(crate) fn get_name(&self) -> &str {
        if self.role.is_controlling() {
            "controlling"
        } else {
            "controlled"
        }
    }

    /// A caller broke the API contract. Panics in debug builds; otherwise
    /// logs and hands the error back with the session untouched.
    pub(crate) fn contract_violation(&self, err: Error) -> Error {
        error!("[{}]: contract violation: {}", self.get_name(), err);
        if cfg!(debug_assertions) {
            panic!("contract violation: {err}");
        }
        err
    }

    /// Pairs every local candidate with every remote candidate sharing its
    /// transport and address family.
    fn pair_candidates(&self, local_ids: &[CandidateId], remote_ids: &[CandidateId]) -> Vec<CandidatePair> {
        let controlling = self.role.is_controlling();
        let mut pairs = vec![];
        for &l in local_ids {
            for &r in remote_ids {
                if let (Some(lc), Some(rc)) = (self.candidates.get(l), self.candidates.get(r)) {
                    if lc.transport_protocol() == rc.transport_protocol()
                        && lc.addr().is_ipv4() == rc.addr().is_ipv4()
                    {
                        pairs.push(CandidatePair::new(l, lc, r, rc, controlling));
                    }
                }
            }
        }
        pairs
    }

    fn trickled_pair_thaws(&self, ci: usize, pair_id: PairId) -> bool {
        let Some(pair) = self.checklists[ci].get(pair_id) else {
            return false;
        };
        let component = pair.component();
        let priority = pair.priority();

        let same_foundation: Vec<&CandidatePair> = self
            .checklists
            .iter()
            .flat_map(|cl| cl.iter())
            .filter(|&(id, p)| id != pair_id && p.foundation() == pair.foundation())
            .map(|(_, p)| p)
            .collect();
        if same_foundation
            .iter()
            .any(|p| p.state() == CandidatePairState::Succeeded)
        {
            return true;
        }
        !same_foundation.iter().any(|p| {
            matches!(
                p.state(),
                CandidatePairState::Waiting | CandidatePairState::InProgress
            ) || p.component() < component
                || (p.component() == component && p.priority() > priority)
        })
    }

    fn checklist_index(&self, component: u16) -> Option<usize> {
        self.checklists
            .iter()
            .position(|cl| cl.component() == component)
    }

    /// The local candidate a datagram received on `local_addr` belongs to.
    /// Host candidates win over reflexive ones sharing their base.
    pub(crate) fn find_local_candidate(&self, transport: &TransportContext) -> Option<CandidateId> {
        let mut found = None;
        for &id in &self.local_candidates {
            let Some(c) = self.candidates.get(id) else {
                continue;
            };
            if c.base() != transport.local_addr
                || c.transport_protocol() != transport.transport_protocol
            {
                continue;
            }
            if c.addr() == transport.local_addr {
                return Some(id);
            }
            found.get_or_insert(id);
        }
        found
    }

    pub(crate) fn find_remote_candidate(
        &self,
        component: u16,
        transport: &TransportContext,
    ) -> Option<CandidateId> {
        self.remote_candidates.iter().copied().find(|&id| {
            self.candidates.get(id).is_some_and(|c| {
                c.component() == component
                    && c.addr() == transport.peer_addr
                    && c.transport_protocol() == transport.transport_protocol
            })
        })
    }

    pub(crate) fn send(&mut self, transport: TransportContext, m: &Message, now: Instant) {
        self.transmits.push_back(TransportMessage {
            now,
            transport,
            message: BytesMut::from(&m.raw[..]),
        });
    }

    /// Answers an authenticated Binding request with its source address.
    pub(crate) fn send_binding_success(
        &mut self,
        m: &Message,
        transport: TransportContext,
        now: Instant,
    ) {
        let mut out = Message::new();
        let result = out.build(&[
            Box::new(m.clone()),
            Box::new(BINDING_SUCCESS),
            Box::new(XorMappedAddress::from(transport.peer_addr)),
            Box::new(MessageIntegrity::new_short_term_integrity(
                self.ufrag_pwd.local_pwd.clone(),
            )),
            Box::new(FINGERPRINT),
        ]);

        match result {
            Ok(()) => self.send(transport, &out, now),
            Err(err) => warn!(
                "[{}]: failed to build success response to {}: {}",
                self.get_name(),
                transport.peer_addr,
                err
            ),
        }
    }

    pub(crate) fn send_binding_error(
        &mut self,
        m: &Message,
        transport: TransportContext,
        code: ErrorCode,
        now: Instant,
    ) {
        let mut out = Message::new();
        let result = out.build(&[
            Box::new(m.clone()),
            Box::new(BINDING_ERROR),
            Box::new(code),
            Box::new(MessageIntegrity::new_short_term_integrity(
                self.ufrag_pwd.local_pwd.clone(),
            )),
            Box::new(FINGERPRINT),
        ]);

        match result {
            Ok(()) => self.send(transport, &out, now),
            Err(err) => warn!(
                "[{}]: failed to build {} response to {}: {}",
                self.get_name(),
                code.0,
                transport.peer_addr,
                err
            ),
        }
    }

    pub(crate) fn handle_inbound(
        &mut self,
        m: &Message,
        transport: TransportContext,
        now: Instant,
    ) -> Result<()> {
        if m.typ.method != METHOD_BINDING {
            trace!(
                "[{}]: unhandled STUN method {} from {}",
                self.get_name(),
                m.typ.method,
                transport.peer_addr
            );
            return Ok(());
        }

        match m.typ.class {
            CLASS_REQUEST => self.handle_binding_request(m, transport, now),
            CLASS_SUCCESS_RESPONSE | CLASS_ERROR_RESPONSE => {
                self.handle_binding_response(m, transport, now)
            }
            _ => {
                trace!(
                    "[{}]: ignoring {} from {}",
                    self.get_name(),
                    m.typ,
                    transport.peer_addr
                );
                Ok(())
            }
        }
    }

    fn handle_binding_request(
        &mut self,
        m: &Message,
        transport: TransportContext,
        now: Instant,
    ) -> Result<()> {
        let Some(local) = self.find_local_candidate(&transport) else {
            debug!(
                "[{}]: discard request, {} is not a local candidate",
                self.get_name(),
                transport.local_addr
            );
            return Ok(());
        };

        {
            let ufrag_pwd = &self.ufrag_pwd;
            if let Err(err) =
                assert_inbound_username(m, &ufrag_pwd.local_ufrag, &ufrag_pwd.remote_ufrag)
                    .and_then(|_| assert_inbound_message_integrity(m, &ufrag_pwd.local_pwd))
            {
                debug!(
                    "[{}]: discard request from {}: {}",
                    self.get_name(),
                    transport.peer_addr,
                    err
                );
                return Ok(());
            }
        }

        let mut priority = PriorityAttr::default();
        let mut control = AttrControl::default();
        if priority.get_from(m).is_err() || control.get_from(m).is_err() {
            debug!(
                "[{}]: request from {} without PRIORITY or role",
                self.get_name(),
                transport.peer_addr
            );
            self.send_binding_error(m, transport, CODE_BAD_REQUEST, now);
            return Ok(());
        }

        if control.role == self.role {
            // RFC 8445 Section 7.3.1.1: the larger tie-breaker keeps its role.
            let keep_role = self.tie_breaker >= control.tie_breaker.0;
            let reject = match self.role {
                Role::Controlling => keep_role,
                Role::Controlled => !keep_role,
            };
            if reject {
                debug!(
                    "[{}]: role conflict with {}, answering 487",
                    self.get_name(),
                    transport.peer_addr
                );
                self.send_binding_error(m, transport, CODE_ROLE_CONFLICT, now);
                return Ok(());
            }
            self.switch_role(self.role.opposite(), now);
        }

        self.send_binding_success(m, transport, now);

        let check = EarlyCheck {
            local,
            transport,
            priority: priority.0,
            use_candidate: UseCandidateAttr::is_set(m),
        };
        if !self.started {
            if self.early_checks.len() >= self.max_early_checks {
                debug!(
                    "[{}]: early check queue full, dropping check from {}",
                    self.get_name(),
                    transport.peer_addr
                );
            } else {
                self.early_checks.push_back(check);
            }
            return Ok(());
        }

        self.on_check_request(check, now);
        Ok(())
    }

    /// Reacts to an authenticated check from the peer: learns peer
    /// reflexive candidates, records USE-CANDIDATE and triggers a check of
    /// our own over the same pair.
    pub(crate) fn on_check_request(&mut self, check: EarlyCheck, now: Instant) {
        if self.state != SessionState::Running && self.state != SessionState::Completed {
            return;
        }
        let Some(component) = self.candidates.get(check.local).map(|c| c.component()) else {
            return;
        };
        let Some(ci) = self.checklist_index(component) else {
            return;
        };

        let remote = match self.find_remote_candidate(component, &check.transport) {
            Some(remote) => remote,
            None => match self.add_remote_peer_reflexive(component, &check) {
                Ok(remote) => remote,
                Err(err) => {
                    warn!(
                        "[{}]: failed to create remote prflx candidate: {}",
                        self.get_name(),
                        err
                    );
                    return;
                }
            },
        };

        let pair_id = match self.checklists[ci].find_pair(check.local, remote) {
            Some(id) => id,
            None => {
                let (Some(l), Some(r)) = (self.candidates.get(check.local), self.candidates.get(remote))
                else {
                    return;
                };
                let pair = CandidatePair::new(check.local, l, remote, r, self.role.is_controlling());
                let id = self.checklists[ci].add_pair(pair);
                if let Err(err) = self.checklists[ci].set_state(id, CandidatePairState::Waiting) {
                    warn!("[{}]: failed to queue new pair: {}", self.get_name(), err);
                }
                trace!("[{}]: new pair from triggered check", self.get_name());
                id
            }
        };

        if let Some(stats) = self.checklists[ci].stats_mut(pair_id) {
            stats.on_request_received();
            stats.on_response_sent();
        }

        if check.use_candidate && !self.role.is_controlling() {
            ControlledSelector::handle_use_candidate(self, ci, pair_id);
        }

        if self.state == SessionState::Running && self.started {
            self.triggered_check(ci, pair_id, now);
        }
        self.update_session_state(now);
    }

    fn add_remote_peer_reflexive(
        &mut self,
        component: u16,
        check: &EarlyCheck,
    ) -> Result<CandidateId> {
        let c = CandidatePeerReflexiveConfig {
            base_config: CandidateConfig {
                transport_protocol: check.transport.transport_protocol,
                address: check.transport.peer_addr.ip().to_string(),
                port: check.transport.peer_addr.port(),
                component,
                priority: check.priority,
                foundation: generate_foundation(),
                ..Default::default()
            },
            ..Default::default()
        }
        .new_candidate_peer_reflexive()?;

        debug!(
            "[{}]: adding a new remote peer-reflexive candidate: {}",
            self.get_name(),
            c.addr()
        );
        let id = self.candidates.insert(c);
        self.remote_candidates.push(id);
        Ok(id)
    }

    /// Records a local peer-reflexive candidate when a check reveals a
    /// mapped address we did not know.
    fn learn_local_peer_reflexive(&mut self, pair: &CandidatePair, mapped: SocketAddr) {
        let known = self.local_candidates.iter().any(|&id| {
            self.candidates
                .get(id)
                .is_some_and(|c| c.component() == pair.component() && c.addr() == mapped)
        });
        if known {
            return;
        }

        let base = pair.local_base();
        let result = CandidatePeerReflexiveConfig {
            base_config: CandidateConfig {
                transport_protocol: pair.transport_protocol,
                address: mapped.ip().to_string(),
                port: mapped.port(),
                component: pair.component(),
                ..Default::default()
            },
            rel_addr: base.ip().to_string(),
            rel_port: base.port(),
        }
        .new_candidate_peer_reflexive();

        match result {
            Ok(c) => {
                debug!(
                    "[{}]: learned local peer-reflexive candidate {} (base {})",
                    self.get_name(),
                    mapped,
                    base
                );
                let id = self.candidates.insert(c);
                self.local_candidates.push(id);
            }
            Err(err) => warn!(
                "[{}]: failed to create local prflx candidate: {}",
                self.get_name(),
                err
            ),
        }
    }

    /// A triggered check: starts right away unless a check is running, in
    /// which case its request is resent now.
    fn triggered_check(&mut self, ci: usize, pair_id: PairId, now: Instant) {
        if self.checklists[ci].state() != ChecklistState::Running {
            return;
        }
        let Some(p) = self.checklists[ci].get(pair_id) else {
            return;
        };

        match p.state() {
            CandidatePairState::Frozen | CandidatePairState::Waiting => {
                if let Err(err) = self.start_check(ci, pair_id, CheckKind::Connectivity, now) {
                    warn!("[{}]: triggered check failed: {}", self.get_name(), err);
                }
            }
            CandidatePairState::InProgress => {
                if let Some(t) = p.transaction() {
                    if let Err(err) = self.engine.retransmit_now(t.handle, now) {
                        debug!(
                            "[{}]: failed to resend check for triggered check: {}",
                            self.get_name(),
                            err
                        );
                    }
                }
            }
            CandidatePairState::Succeeded | CandidatePairState::Failed => {}
        }
    }

    /// Builds and sends a check over the pair and binds its transaction.
    pub(crate) fn start_check(
        &mut self,
        ci: usize,
        pair_id: PairId,
        kind: CheckKind,
        now: Instant,
    ) -> Result<()> {
        let (local, transport, component) = {
            let p = self.checklists[ci]
                .get(pair_id)
                .ok_or(Error::ErrPairNotExists)?;
            (
                p.local(),
                TransportContext {
                    local_addr: p.local_base(),
                    peer_addr: p.remote_addr(),
                    transport_protocol: p.transport_protocol,
                },
                p.component(),
            )
        };
        let local = self
            .candidates
            .get(local)
            .ok_or(Error::ErrPairNotExists)?;
        let priority = local.peer_reflexive_priority();
        let relayed = local.is_relayed().then(|| local.addr());

        let use_candidate = match kind {
            CheckKind::Nomination => true,
            CheckKind::Connectivity => {
                self.role.is_controlling() && self.nomination == NominationMode::Aggressive
            }
            CheckKind::Keepalive => false,
        };

        let mut setters: Vec<Box<dyn Setter>> = vec![
            Box::new(BINDING_REQUEST),
            Box::new(TransactionId::new()),
            Box::new(Username::new(
                ATTR_USERNAME,
                format!(
                    "{}:{}",
                    self.ufrag_pwd.remote_ufrag, self.ufrag_pwd.local_ufrag
                ),
            )),
            Box::new(AttrControl::new(self.role, self.tie_breaker)),
            Box::new(PriorityAttr(priority)),
        ];
        if use_candidate {
            setters.push(Box::new(UseCandidateAttr::new()));
        }
        setters.push(Box::new(MessageIntegrity::new_short_term_integrity(
            self.ufrag_pwd.remote_pwd.clone(),
        )));
        setters.push(Box::new(FINGERPRINT));

        let mut msg = Message::new();
        msg.build(&setters)?;

        if let Some(relayed) = relayed {
            if self.permissions.insert((relayed, transport.peer_addr)) {
                self.events.push_back(Event::CreatePermission {
                    component,
                    relayed,
                    peer: transport.peer_addr,
                });
            }
        }

        let handle = self.engine.start(&msg, transport, now)?;
        let bound = self.checklists[ci].start_check(
            pair_id,
            PairTransaction {
                handle,
                kind,
                sent_role: self.role,
                use_candidate,
            },
        );
        if let Err(err) = bound {
            self.engine.cancel(handle);
            return Err(self.contract_violation(err));
        }

        trace!(
            "[{}]: {:?} check {} from {} to {}",
            self.get_name(),
            kind,
            msg.transaction_id,
            transport.local_addr,
            transport.peer_addr
        );
        if let Some(stats) = self.checklists[ci].stats_mut(pair_id) {
            match kind {
                CheckKind::Keepalive => stats.on_keepalive_sent(),
                _ => stats.on_request_sent(),
            }
        }

        Ok(())
    }

    fn handle_binding_response(
        &mut self,
        m: &Message,
        transport: TransportContext,
        now: Instant,
    ) -> Result<()> {
        let Some(handle) = self.engine.lookup(&m.transaction_id) else {
            debug!(
                "[{}]: discard response from {}, unknown transaction {}",
                self.get_name(),
                transport.peer_addr,
                m.transaction_id
            );
            return Ok(());
        };
        let Some((ci, pair_id)) = self.find_pair_by_transaction(handle) else {
            debug!(
                "[{}]: discard response from {}, no pair for transaction {}",
                self.get_name(),
                transport.peer_addr,
                m.transaction_id
            );
            self.engine.cancel(handle);
            return Ok(());
        };

        if let Err(err) = assert_inbound_message_integrity(m, &self.ufrag_pwd.remote_pwd) {
            debug!(
                "[{}]: discard response from {}: {}",
                self.get_name(),
                transport.peer_addr,
                err
            );
            return Ok(());
        }

        match self
            .engine
            .on_response(handle, m, transport.peer_addr, now)?
        {
            TransactionResult::StillPending => {}
            TransactionResult::Success {
                mapped_address,
                rtt,
            } => {
                if let Some(stats) = self.checklists[ci].stats_mut(pair_id) {
                    stats.on_response_received(Some(rtt));
                }
                let outcome = CheckOutcome::Succeeded { mapped_address };
                if let Some(t) = self.checklists[ci].mark_result(pair_id, handle, outcome) {
                    self.on_check_succeeded(ci, pair_id, t, mapped_address, now);
                }
            }
            TransactionResult::Failure { code, reason, rtt } => {
                if let Some(stats) = self.checklists[ci].stats_mut(pair_id) {
                    stats.on_response_received(Some(rtt));
                }
                if code == Some(CODE_ROLE_CONFLICT.0) {
                    self.on_role_conflict_response(ci, pair_id, handle, now);
                } else {
                    debug!(
                        "[{}]: check to {} failed: {:?} {}",
                        self.get_name(),
                        transport.peer_addr,
                        code,
                        reason
                    );
                    if let Some(t) =
                        self.checklists[ci].mark_result(pair_id, handle, CheckOutcome::Failed)
                    {
                        self.on_check_failed(ci, pair_id, t, now);
                    }
                }
            }
        }

        self.update_session_state(now);
        Ok(())
    }

    /// RFC 8445 Section 7.2.5.1: a 487 flips our role if we still hold the
    /// role the request announced, then the check is retried.
    fn on_role_conflict_response(
        &mut self,
        ci: usize,
        pair_id: PairId,
        handle: TransactionHandle,
        now: Instant,
    ) {
        let Some(t) = self.checklists[ci]
            .detach(pair_id)
            .filter(|t| t.handle == handle)
        else {
            return;
        };

        if self.role == t.sent_role {
            self.switch_role(self.role.opposite(), now);
        }

        let retry = match t.kind {
            CheckKind::Nomination if !self.role.is_controlling() => None,
            kind => Some(kind),
        };
        if let Some(kind) = retry {
            if let Err(err) = self.start_check(ci, pair_id, kind, now) {
                warn!(
                    "[{}]: failed to retry check after role conflict: {}",
                    self.get_name(),
                    err
                );
                self.checklists[ci].abandon(pair_id);
            }
        }
    }

    fn find_pair_by_transaction(&self, handle: TransactionHandle) -> Option<(usize, PairId)> {
        self.checklists
            .iter()
            .enumerate()
            .find_map(|(ci, cl)| cl.find_by_transaction(handle).map(|id| (ci, id)))
    }

    fn on_check_succeeded(
        &mut self,
        ci: usize,
        pair_id: PairId,
        t: PairTransaction,
        mapped_address: SocketAddr,
        now: Instant,
    ) {
        let Some(pair) = self.checklists[ci].get(pair_id).cloned() else {
            return;
        };
        let component = pair.component();

        match t.kind {
            CheckKind::Connectivity => {
                trace!("[{}]: found valid candidate pair: {}", self.get_name(), pair);
                self.learn_local_peer_reflexive(&pair, mapped_address);

                for cl in &mut self.checklists {
                    cl.unfreeze_foundation(pair.foundation());
                }

                if self.role.is_controlling() {
                    let cancelled = self.checklists[ci].cancel_lower_in_progress(pair_id);
                    for c in cancelled {
                        self.engine.cancel(c.handle);
                    }
                    if t.use_candidate {
                        self.nominate(ci, pair_id);
                    } else {
                        ControllingSelector::maybe_nominate(self, ci, now);
                    }
                } else if pair.use_candidate_received {
                    self.nominate(ci, pair_id);
                }
            }
            CheckKind::Nomination => {
                info!(
                    "[{}]: nominated pair for component {}: {}",
                    self.get_name(),
                    component,
                    pair
                );
                self.emit_nominated(ci, pair_id);
            }
            CheckKind::Keepalive => {
                if self.keepalive_failed.remove(&component) {
                    info!(
                        "[{}]: connectivity restored on component {}",
                        self.get_name(),
                        component
                    );
                    self.events
                        .push_back(Event::ConnectivityRestored { component });
                }
            }
        }
    }

    fn on_check_failed(&mut self, ci: usize, pair_id: PairId, t: PairTransaction, now: Instant) {
        let Some((component, foundation)) = self.checklists[ci]
            .get(pair_id)
            .map(|p| (p.component(), p.foundation().to_owned()))
        else {
            return;
        };

        match t.kind {
            CheckKind::Connectivity => {
                if self.checklists[ci].unfreeze_next(&foundation).is_none() {
                    for cl in &mut self.checklists {
                        if cl.unfreeze_next(&foundation).is_some() {
                            break;
                        }
                    }
                }
                if self.role.is_controlling() {
                    ControllingSelector::maybe_nominate(self, ci, now);
                }
            }
            CheckKind::Nomination => {
                warn!(
                    "[{}]: nomination failed on component {}",
                    self.get_name(),
                    component
                );
                if self.role.is_controlling() {
                    ControllingSelector::maybe_nominate(self, ci, now);
                }
            }
            CheckKind::Keepalive => {
                if self.keepalive_failed.insert(component) {
                    warn!(
                        "[{}]: keepalive failed on component {}",
                        self.get_name(),
                        component
                    );
                    self.events.push_back(Event::KeepaliveFailed { component });
                }
            }
        }
    }

    /// Marks a valid pair nominated, at most one per component.
    pub(crate) fn nominate(&mut self, ci: usize, pair_id: PairId) {
        if self.checklists[ci].nominated_pair().is_some() {
            return;
        }
        if self.checklists[ci].nominate(pair_id) {
            self.emit_nominated(ci, pair_id);
        }
    }

    fn emit_nominated(&mut self, ci: usize, pair_id: PairId) {
        if let Some(p) = self.checklists[ci].get(pair_id) {
            self.events.push_back(Event::PairNominated {
                component: p.component(),
                pair: p.info(),
            });
        }
    }

    pub(crate) fn handle_transaction_events(&mut self, now: Instant) {
        while let Some(event) = self.engine.poll_event() {
            match event {
                TransactionEvent::Retransmitted { handle } => {
                    if let Some((ci, pair_id)) = self.find_pair_by_transaction(handle) {
                        if let Some(stats) = self.checklists[ci].stats_mut(pair_id) {
                            stats.on_retransmit();
                        }
                    }
                }
                TransactionEvent::TimedOut {
                    handle,
                    transaction_id,
                } => {
                    let Some((ci, pair_id)) = self.find_pair_by_transaction(handle) else {
                        continue;
                    };
                    debug!(
                        "[{}]: check {} timed out",
                        self.get_name(),
                        transaction_id
                    );
                    if let Some(t) =
                        self.checklists[ci].mark_result(pair_id, handle, CheckOutcome::Failed)
                    {
                        self.on_check_failed(ci, pair_id, t, now);
                    }
                }
            }
        }
        self.update_session_state(now);
    }

    /// One paced tick: the next scheduled pair gets its check.
    pub(crate) fn on_tick(&mut self, now: Instant) {
        if self.state != SessionState::Running {
            return;
        }
        if let Some((ci, pair_id)) = self.scheduler.next_check(&self.checklists) {
            if let Err(err) = self.start_check(ci, pair_id, CheckKind::Connectivity, now) {
                warn!("[{}]: failed to start check: {}", self.get_name(), err);
            }
        }
        self.refresh_scheduler(now);
    }

    /// Keeps the pacing tick armed only while some running checklist has a
    /// pair left to check.
    fn refresh_scheduler(&mut self, now: Instant) {
        let schedulable = self
            .checklists
            .iter()
            .filter(|cl| cl.state() == ChecklistState::Running)
            .any(|cl| cl.next_waiting_pair().is_some() || cl.next_frozen_pair().is_some());
        if schedulable {
            self.scheduler.resume(now);
        } else if self.scheduler.is_running() {
            trace!("[{}]: nothing left to schedule", self.get_name());
            self.scheduler.stop();
        }
    }

    pub(crate) fn handle_session_timer(&mut self, timer: SessionTimer, now: Instant) {
        self.armed.remove(&timer);

        match timer {
            SessionTimer::Keepalive(component) => {
                if self.state != SessionState::Completed {
                    return;
                }
                if let Some(ci) = self.checklist_index(component) {
                    let in_flight = self.checklists[ci]
                        .nominated_pair()
                        .and_then(|id| self.checklists[ci].get(id).map(|p| (id, p.transaction())));
                    if let Some((pair_id, None)) = in_flight {
                        if let Err(err) = self.start_check(ci, pair_id, CheckKind::Keepalive, now) {
                            warn!("[{}]: failed to send keepalive: {}", self.get_name(), err);
                        }
                    }
                }
                self.arm(timer, now + self.keepalive_interval);
            }
            SessionTimer::PermissionRefresh(component) => {
                if self.state != SessionState::Completed {
                    return;
                }
                if let Some(info) = self.nominated_pair(component) {
                    if info.local_type == CandidateType::Relay {
                        self.events.push_back(Event::CreatePermission {
                            component,
                            relayed: info.local_addr,
                            peer: info.remote_addr,
                        });
                    }
                }
                self.arm(timer, now + self.permission_refresh_interval);
            }
            SessionTimer::NominationWait => {
                if self.state != SessionState::Running {
                    return;
                }
                for cl in &mut self.checklists {
                    if cl.state() == ChecklistState::Running && cl.nominated_pair().is_none() {
                        cl.fail();
                    }
                }
                warn!("[{}]: no nomination received in time", self.get_name());
                self.update_session_state(now);
            }
            SessionTimer::EndOfCandidates => {
                if self.trickling {
                    info!(
                        "[{}]: no end-of-candidates in time, ignoring further candidates",
                        self.get_name()
                    );
                    self.trickling = false;
                    self.update_session_state(now);
                }
            }
        }
    }

    pub(crate) fn arm(&mut self, timer: SessionTimer, deadline: Instant) {
        if let Some(old) = self.armed.remove(&timer) {
            self.timers.cancel(old);
        }
        let handle = self.timers.schedule(deadline, timer);
        self.armed.insert(timer, handle);
    }

    pub(crate) fn disarm(&mut self, timer: SessionTimer) {
        if let Some(old) = self.armed.remove(&timer) {
            self.timers.cancel(old);
        }
    }

    /// Folds the checklist states into the session state.
    pub(crate) fn update_session_state(&mut self, now: Instant) {
        if self.state != SessionState::Running || !self.started {
            return;
        }

        let may_fail = !self.trickling;
        for ci in 0..self.checklists.len() {
            let prev = self.checklists[ci].state();
            if self.checklists[ci].update_state(may_fail) == ChecklistState::Completed
                && prev != ChecklistState::Completed
            {
                for t in self.checklists[ci].cancel_all_in_progress() {
                    self.engine.cancel(t.handle);
                }
            }
        }

        if self
            .checklists
            .iter()
            .all(|cl| cl.state() == ChecklistState::Completed)
        {
            self.set_state(SessionState::Completed, now);
            return;
        }

        let active = self
            .checklists
            .iter()
            .filter(|cl| cl.state() == ChecklistState::Running)
            .count();
        self.scheduler.set_ta(self.pacing.check_interval(active));

        if self.role.is_controlling() {
            if self.nomination == NominationMode::Regular {
                for ci in 0..self.checklists.len() {
                    ControllingSelector::maybe_nominate(self, ci, now);
                }
            }
            self.disarm(SessionTimer::NominationWait);
        } else {
            ControlledSelector::check_nomination_wait(self, now);
        }

        // A failed component never gets a pair, but the others finish
        // their checks first.
        let failed = self
            .checklists
            .iter()
            .any(|cl| cl.state() == ChecklistState::Failed);
        let checking = self
            .checklists
            .iter()
            .any(|cl| cl.state() == ChecklistState::Running && cl.has_pending_checks());
        if failed && !checking {
            self.set_state(SessionState::Failed, now);
            return;
        }

        self.refresh_scheduler(now);
    }

    fn set_state(&mut self, state: SessionState, now: Instant) {
        if self.state == state {
            return;
        }
        info!("[{}]: session state {} -> {}", self.get_name(), self.state, state);
        self.state = state;

        match state {
            SessionState::Completed => {
                self.scheduler.stop();
                self.disarm(SessionTimer::NominationWait);
                let mut relayed = vec![];
                for cl in &self.checklists {
                    let nominated = cl.nominated_pair().and_then(|id| cl.get(id));
                    if nominated.is_some_and(|p| p.local_type == CandidateType::Relay) {
                        relayed.push(cl.component());
                    }
                }
                for component in self.checklists.iter().map(|cl| cl.component()).collect::<Vec<_>>() {
                    self.arm(SessionTimer::Keepalive(component), now + self.keepalive_interval);
                }
                for component in relayed {
                    self.arm(
                        SessionTimer::PermissionRefresh(component),
                        now + self.permission_refresh_interval,
                    );
                }
            }
            SessionState::Failed => {
                self.teardown();
            }
            SessionState::Running => {}
        }

        self.events.push_back(Event::StateChanged(state));
    }

    /// Drops every transaction and timer.
    fn teardown(&mut self) {
        self.engine.cancel_all();
        for cl in &mut self.checklists {
            cl.detach_all();
        }
        self.timers.clear();
        self.armed.clear();
        self.scheduler.stop();
        self.early_checks.clear();
    }

    /// Changes role: pair priorities are recomputed and running checks are
    /// restarted so they carry the new role.
    pub(crate) fn switch_role(&mut self, role: Role, now: Instant) {
        if self.role == role {
            return;
        }
        info!("[{}]: switching role to {}", self.get_name(), role);
        self.role = role;
        self.events.push_back(Event::RoleChanged(role));

        let controlling = role.is_controlling();
        for ci in 0..self.checklists.len() {
            self.checklists[ci].recompute_priorities(controlling);

            let running: Vec<(PairId, PairTransaction)> = self.checklists[ci]
                .iter()
                .filter_map(|(id, p)| p.transaction().map(|t| (id, t)))
                .filter(|(_, t)| t.kind != CheckKind::Keepalive)
                .collect();
            for (pair_id, t) in running {
                self.checklists[ci].detach(pair_id);
                self.engine.cancel(t.handle);
                if t.kind == CheckKind::Connectivity {
                    if let Err(err) = self.start_check(ci, pair_id, t.kind, now) {
                        warn!(
                            "[{}]: failed to restart check after role change: {}",
                            self.get_name(),
                            err
                        );
                        self.checklists[ci].abandon(pair_id);
                    }
                }
            }
        }
    }
}
