
use serde::Serialize;
use std::time::Duration;

/// Per-pair connectivity check counters.
///
/// Updated by the session as checks are sent and answered; a copy is handed
/// out with every [`CandidatePairInfo`](crate::candidate::candidate_pair::CandidatePairInfo).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CandidatePairStats {
    /// Number of STUN connectivity check requests sent, retransmissions included.
    pub requests_sent: u64,
    /// Number of retransmitted requests.
    pub retransmissions_sent: u64,
    /// Number of STUN connectivity check requests received.
    pub requests_received: u64,
    /// Number of STUN connectivity check responses sent.
    pub responses_sent: u64,
    /// Number of STUN connectivity check responses received.
    pub responses_received: u64,
    /// Number of requests the transport failed to send.
    pub transport_errors: u64,
    /// Number of keepalive checks sent after completion.
    pub keepalives_sent: u64,

    /// Total round trip time in seconds for all STUN requests.
    ///
    /// Divide by `responses_received` to get the average RTT.
    pub total_round_trip_time: f64,
    /// The most recent round trip time measurement in seconds.
    pub current_round_trip_time: f64,
}

impl CandidatePairStats {
    pub fn on_request_sent(&mut self) {
        self.requests_sent += 1;
    }

    pub fn on_retransmit(&mut self) {
        self.requests_sent += 1;
        self.retransmissions_sent += 1;
    }

    pub fn on_keepalive_sent(&mut self) {
        self.keepalives_sent += 1;
    }

    pub fn on_request_received(&mut self) {
        self.requests_received += 1;
    }

    pub fn on_response_sent(&mut self) {
        self.responses_sent += 1;
    }

    /// Called for every accepted response, successful or not.
    pub fn on_response_received(&mut self, rtt: Option<Duration>) {
        self.responses_received += 1;
        if let Some(rtt) = rtt {
            let rtt_seconds = rtt.as_secs_f64();
            self.current_round_trip_time = rtt_seconds;
            self.total_round_trip_time += rtt_seconds;
        }
    }

    pub fn on_transport_error(&mut self) {
        self.transport_errors += 1;
    }
}
