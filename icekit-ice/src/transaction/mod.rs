#[cfg(test)]
mod transaction_test;

use bytes::BytesMut;
use log::{debug, trace};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use stun::error_code::*;
use stun::message::*;
use stun::xoraddr::*;

use crate::arena::{Arena, Index};
use crate::timer::{TimerHandle, TimerQueue};
use crate::timing::Pacing;
use shared::error::*;
use shared::{TaggedBytesMut, TransportContext, TransportMessage};

/// Handle of a live transaction. It goes stale the moment the transaction
/// completes, times out or is cancelled.
pub type TransactionHandle = Index<Transaction>;

/// State of one outstanding STUN request: what was sent, where, how often,
/// and the retransmission timer that is armed for it.
pub struct Transaction {
    transaction_id: TransactionId,
    transport: TransportContext,
    raw: Vec<u8>,
    transmissions: u32,
    started_at: Instant,
    timer: Option<TimerHandle<TransactionHandle>>,
}

impl Transaction {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn transport(&self) -> TransportContext {
        self.transport
    }

    pub fn transmissions(&self) -> u32 {
        self.transmissions
    }
}

/// Outcome of feeding a response to [`TransactionEngine::on_response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionResult {
    Success {
        mapped_address: SocketAddr,
        rtt: Duration,
    },
    Failure {
        /// ERROR-CODE of an error response; `None` when a success response
        /// could not be used.
        code: Option<u16>,
        reason: String,
        rtt: Duration,
    },
    /// Not a response to this transaction; it keeps running.
    StillPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    Retransmitted {
        handle: TransactionHandle,
    },
    TimedOut {
        handle: TransactionHandle,
        transaction_id: TransactionId,
    },
}

/// Runs STUN client transactions: sends a request, retransmits it on the
/// RFC 5389 schedule, and completes it exactly once on the first matching
/// response or on timeout.
pub struct TransactionEngine {
    pacing: Pacing,
    transactions: Arena<Transaction>,
    by_id: HashMap<TransactionId, TransactionHandle>,
    timers: TimerQueue<TransactionHandle>,
    transmits: VecDeque<TaggedBytesMut>,
    events: VecDeque<TransactionEvent>,
    closed: bool,
}

impl TransactionEngine {
    pub fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            transactions: Arena::new(),
            by_id: HashMap::new(),
            timers: TimerQueue::new(),
            transmits: VecDeque::new(),
            events: VecDeque::new(),
            closed: false,
        }
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// Sends `request` to `transport.peer_addr` and arms the first
    /// retransmission timer.
    pub fn start(
        &mut self,
        request: &Message,
        transport: TransportContext,
        now: Instant,
    ) -> Result<TransactionHandle> {
        if self.closed {
            return Err(Error::ErrTransactionEngineClosed);
        }
        if self.by_id.contains_key(&request.transaction_id) {
            return Err(Error::ErrTransactionExists);
        }

        let handle = self.transactions.insert(Transaction {
            transaction_id: request.transaction_id,
            transport,
            raw: request.raw.clone(),
            transmissions: 0,
            started_at: now,
            timer: None,
        });
        self.by_id.insert(request.transaction_id, handle);
        self.transmit(handle, now);

        trace!(
            "transaction {} started to {}",
            request.transaction_id, transport.peer_addr
        );

        Ok(handle)
    }

    /// Sends the request once more and re-arms its timer.
    fn transmit(&mut self, handle: TransactionHandle, now: Instant) {
        let Some(t) = self.transactions.get_mut(handle) else {
            return;
        };

        let wait = self.pacing.retransmit_timeout(t.transmissions);
        t.transmissions += 1;
        self.transmits.push_back(TransportMessage {
            now,
            transport: t.transport,
            message: BytesMut::from(&t.raw[..]),
        });

        if let Some(timer) = t.timer.take() {
            self.timers.cancel(timer);
        }
        t.timer = Some(self.timers.schedule(now + wait, handle));
    }

    /// Sends the request again right away without touching the schedule,
    /// for a triggered check on a pair whose check is already running.
    pub fn retransmit_now(&mut self, handle: TransactionHandle, now: Instant) -> Result<()> {
        let t = self
            .transactions
            .get(handle)
            .ok_or(Error::ErrTransactionNotExists)?;

        self.transmits.push_back(TransportMessage {
            now,
            transport: t.transport,
            message: BytesMut::from(&t.raw[..]),
        });
        Ok(())
    }

    pub fn lookup(&self, transaction_id: &TransactionId) -> Option<TransactionHandle> {
        self.by_id.get(transaction_id).copied()
    }

    pub fn get(&self, handle: TransactionHandle) -> Option<&Transaction> {
        self.transactions.get(handle)
    }

    /// Matches a decoded response against the transaction. Only a response
    /// with the same transaction id coming from the address the request was
    /// sent to completes it; anything else leaves it running.
    pub fn on_response(
        &mut self,
        handle: TransactionHandle,
        response: &Message,
        source: SocketAddr,
        now: Instant,
    ) -> Result<TransactionResult> {
        let t = self
            .transactions
            .get(handle)
            .ok_or(Error::ErrTransactionNotExists)?;

        if response.transaction_id != t.transaction_id {
            debug!(
                "transaction {}: ignoring response for {}",
                t.transaction_id, response.transaction_id
            );
            return Ok(TransactionResult::StillPending);
        }
        if source != t.transport.peer_addr {
            debug!(
                "transaction {}: ignoring response from {}, expected {}",
                t.transaction_id, source, t.transport.peer_addr
            );
            return Ok(TransactionResult::StillPending);
        }

        let rtt = now.saturating_duration_since(t.started_at);
        let result = match response.typ.class {
            CLASS_SUCCESS_RESPONSE => {
                let mut addr = XorMappedAddress::default();
                match addr.get_from(response) {
                    Ok(()) => TransactionResult::Success {
                        mapped_address: SocketAddr::new(addr.ip, addr.port),
                        rtt,
                    },
                    Err(err) => TransactionResult::Failure {
                        code: None,
                        reason: format!("unusable XOR-MAPPED-ADDRESS: {err}"),
                        rtt,
                    },
                }
            }
            CLASS_ERROR_RESPONSE => {
                let mut code = ErrorCodeAttribute::default();
                match code.get_from(response) {
                    Ok(()) => TransactionResult::Failure {
                        code: Some(code.code.0),
                        reason: String::from_utf8_lossy(&code.reason).into_owned(),
                        rtt,
                    },
                    Err(_) => TransactionResult::Failure {
                        code: None,
                        reason: "error response without ERROR-CODE".to_owned(),
                        rtt,
                    },
                }
            }
            _ => return Ok(TransactionResult::StillPending),
        };

        self.remove(handle);
        Ok(result)
    }

    /// Stops the transaction. Its timer is cancelled before its state is
    /// dropped. Returns false for a stale handle.
    pub fn cancel(&mut self, handle: TransactionHandle) -> bool {
        self.remove(handle)
    }

    fn remove(&mut self, handle: TransactionHandle) -> bool {
        let Some(timer) = self.transactions.get_mut(handle).map(|t| t.timer.take()) else {
            return false;
        };
        if let Some(timer) = timer {
            self.timers.cancel(timer);
        }

        match self.transactions.remove(handle) {
            Some(t) => {
                self.by_id.remove(&t.transaction_id);
                true
            }
            None => false,
        }
    }

    pub fn handle_timeout(&mut self, now: Instant) {
        while let Some(handle) = self.timers.pop_expired(now) {
            let Some(t) = self.transactions.get_mut(handle) else {
                continue;
            };
            t.timer = None;

            if t.transmissions >= self.pacing.max_transmissions {
                let transaction_id = t.transaction_id;
                self.remove(handle);
                debug!("transaction {transaction_id} timed out");
                self.events.push_back(TransactionEvent::TimedOut {
                    handle,
                    transaction_id,
                });
            } else {
                self.transmit(handle, now);
                self.events
                    .push_back(TransactionEvent::Retransmitted { handle });
            }
        }
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.timers.poll_timeout()
    }

    pub fn poll_transmit(&mut self) -> Option<TaggedBytesMut> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<TransactionEvent> {
        self.events.pop_front()
    }

    /// Number of armed retransmission timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Drops every transaction and timer. Queued transmits are discarded.
    pub fn cancel_all(&mut self) {
        self.timers.clear();
        self.transactions.clear();
        self.by_id.clear();
        self.transmits.clear();
        self.events.clear();
    }

    pub fn close(&mut self) {
        self.cancel_all();
        self.closed = true;
    }
}
