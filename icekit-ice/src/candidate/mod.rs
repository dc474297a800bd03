#[cfg(test)]
mod candidate_test;

pub mod candidate_host;
pub mod candidate_pair;
pub mod candidate_peer_reflexive;
pub mod candidate_relay;
pub mod candidate_server_reflexive;

use crc::{CRC_32_ISCSI, Crc};
use serde::{Deserialize, Serialize};
use shared::TransportProtocol;
use shared::error::*;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::arena::Index;
use crate::rand::generate_cand_id;

pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;

/// Indicates that the candidate is used for RTP.
pub const COMPONENT_RTP: u16 = 1;
/// Indicates that the candidate is used for RTCP.
pub const COMPONENT_RTCP: u16 = 2;

/// Handle of a candidate stored in the session's candidate arena.
pub type CandidateId = Index<Candidate>;

/// Represents the type of candidate `CandidateType` enum.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateType {
    #[default]
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx")]
    ServerReflexive,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

// String makes CandidateType printable
impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
        };
        write!(f, "{s}")
    }
}

impl CandidateType {
    /// Returns the preference weight of a `CandidateType`.
    ///
    /// 4.1.2.2.  Guidelines for Choosing Type and Local Preferences
    /// The RECOMMENDED values are 126 for host candidates, 100
    /// for server reflexive candidates, 110 for peer reflexive candidates,
    /// and 0 for relayed candidates.
    #[must_use]
    pub const fn preference(self) -> u16 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relay => 0,
        }
    }
}

/// RFC 8445 Section 5.1.2.1:
/// priority = (2^24)*(type preference) + (2^8)*(local preference) + (2^0)*(256 - component ID)
pub fn compute_priority(candidate_type: CandidateType, local_preference: u16, component: u16) -> u32 {
    (1 << 24) * u32::from(candidate_type.preference())
        + (1 << 8) * u32::from(local_preference)
        + (256 - u32::from(component.min(256)))
}

/// Fields shared by every candidate builder.
#[derive(Default, Debug, Clone)]
pub struct CandidateConfig {
    pub candidate_id: String,
    pub transport_protocol: TransportProtocol,
    pub address: String,
    pub port: u16,
    pub component: u16,
    /// Overrides the computed priority when non-zero, e.g. for remote
    /// candidates whose priority was signalled by the peer.
    pub priority: u32,
    /// Overrides the computed foundation when non-empty.
    pub foundation: String,
    /// Defaults to 65535. Must be unique among local candidates of the same
    /// type and component.
    pub local_preference: Option<u16>,
}

impl CandidateConfig {
    pub(crate) fn build(
        self,
        candidate_type: CandidateType,
        related_address: Option<SocketAddr>,
        base: Option<SocketAddr>,
    ) -> Result<Candidate> {
        if self.component == 0 || self.component > 256 {
            return Err(Error::ErrInvalidComponent(self.component));
        }

        let ip: IpAddr = match self.address.parse() {
            Ok(ip) => ip,
            Err(_) => return Err(Error::ErrAddressParseFailed),
        };
        let addr = SocketAddr::new(ip, self.port);

        let mut candidate_id = self.candidate_id;
        if candidate_id.is_empty() {
            candidate_id = generate_cand_id();
        }

        Ok(Candidate {
            id: candidate_id,
            candidate_type,
            transport_protocol: self.transport_protocol,
            component: self.component,
            addr,
            base: base.unwrap_or(addr),
            related_address,
            foundation_override: self.foundation,
            priority_override: self.priority,
            local_preference: self.local_preference.unwrap_or(DEFAULT_LOCAL_PREFERENCE),
        })
    }
}

/// Parses the `rel_addr`/`rel_port` pair carried by the reflexive and relay
/// builders. An empty address means none was given.
pub(crate) fn parse_related_address(rel_addr: &str, rel_port: u16) -> Result<Option<SocketAddr>> {
    if rel_addr.is_empty() {
        return Ok(None);
    }

    match rel_addr.parse::<IpAddr>() {
        Ok(ip) => Ok(Some(SocketAddr::new(ip, rel_port))),
        Err(_) => Err(Error::ErrAddressParseFailed),
    }
}

/// An ICE candidate: a transport address with its type, component,
/// foundation and priority. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub(crate) id: String,
    pub(crate) candidate_type: CandidateType,
    pub(crate) transport_protocol: TransportProtocol,
    pub(crate) component: u16,
    pub(crate) addr: SocketAddr,
    pub(crate) base: SocketAddr,
    pub(crate) related_address: Option<SocketAddr>,

    pub(crate) foundation_override: String,
    pub(crate) priority_override: u32,
    pub(crate) local_preference: u16,
}

// String makes the candidate printable
impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(related_address) = self.related_address {
            write!(
                f,
                "{} {} {} related {}",
                self.transport_protocol, self.candidate_type, self.addr, related_address,
            )
        } else {
            write!(
                f,
                "{} {} {}",
                self.transport_protocol, self.candidate_type, self.addr,
            )
        }
    }
}

impl Candidate {
    /// Candidates sharing type, base IP and transport share a foundation.
    pub fn foundation(&self) -> String {
        if !self.foundation_override.is_empty() {
            return self.foundation_override.clone();
        }

        let mut buf = vec![];
        buf.extend_from_slice(self.candidate_type.to_string().as_bytes());
        buf.extend_from_slice(self.base.ip().to_string().as_bytes());
        buf.extend_from_slice(self.transport_protocol.to_string().as_bytes());

        let checksum = Crc::<u32>::new(&CRC_32_ISCSI).checksum(&buf);

        format!("{checksum}")
    }

    /// Returns Candidate ID.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns candidate component.
    pub fn component(&self) -> u16 {
        self.component
    }

    /// Returns candidate type.
    pub fn candidate_type(&self) -> CandidateType {
        self.candidate_type
    }

    pub fn transport_protocol(&self) -> TransportProtocol {
        self.transport_protocol
    }

    /// The advertised transport address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The address checks are sent from. For host and relayed candidates this
    /// is the candidate itself; reflexive candidates use the host address
    /// they were learned through.
    pub fn base(&self) -> SocketAddr {
        self.base
    }

    pub fn related_address(&self) -> Option<SocketAddr> {
        self.related_address
    }

    pub fn is_relayed(&self) -> bool {
        self.candidate_type == CandidateType::Relay
    }

    /// Returns the local preference for this candidate.
    pub fn local_preference(&self) -> u16 {
        self.local_preference
    }

    /// Computes the priority for this ICE Candidate.
    pub fn priority(&self) -> u32 {
        if self.priority_override != 0 {
            return self.priority_override;
        }

        // The local preference MUST be an integer from 0 (lowest preference) to
        // 65535 (highest preference) inclusive.  When there is only a single IP
        // address, this value SHOULD be set to 65535.  If there are multiple
        // candidates for a particular component for a particular data stream
        // that have the same type, the local preference MUST be unique for each
        // one.
        compute_priority(self.candidate_type, self.local_preference, self.component)
    }

    /// The value sent in the PRIORITY attribute of a check: the priority this
    /// candidate would have if it were learned as peer reflexive.
    pub fn peer_reflexive_priority(&self) -> u32 {
        compute_priority(
            CandidateType::PeerReflexive,
            self.local_preference,
            self.component,
        )
    }

    /// Same transport, type and address, including the related address.
    pub fn equal(&self, other: &Candidate) -> bool {
        self.transport_protocol == other.transport_protocol
            && self.candidate_type == other.candidate_type
            && self.addr == other.addr
            && self.related_address == other.related_address
    }
}
