use bytes::BytesMut;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

/// Type of transport protocol, either UDP or TCP
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportProtocol {
    /// UDP
    #[default]
    UDP,
    /// TCP
    TCP,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::UDP => "udp",
            Self::TCP => "tcp",
        };
        write!(f, "{s}")
    }
}

/// Transport Context with local address, peer address and protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportContext {
    /// Local socket address, either IPv4 or IPv6
    pub local_addr: SocketAddr,
    /// Peer socket address, either IPv4 or IPv6
    pub peer_addr: SocketAddr,
    /// Type of transport protocol, either UDP or TCP
    pub transport_protocol: TransportProtocol,
}

impl TransportContext {
    /// Returns the context as seen from the other end of the path.
    pub fn reversed(&self) -> Self {
        Self {
            local_addr: self.peer_addr,
            peer_addr: self.local_addr,
            transport_protocol: self.transport_protocol,
        }
    }
}

impl Default for TransportContext {
    fn default() -> Self {
        Self {
            local_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            peer_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            transport_protocol: TransportProtocol::UDP,
        }
    }
}

/// A generic transmit with [TransportContext]
#[derive(Debug, Clone)]
pub struct TransportMessage<T> {
    /// Received/Sent time
    pub now: Instant,
    /// A transport context with [local_addr](TransportContext::local_addr) and [peer_addr](TransportContext::peer_addr)
    pub transport: TransportContext,
    /// Message body with generic type
    pub message: T,
}

/// BytesMut type transmit with [TransportContext]
pub type TaggedBytesMut = TransportMessage<BytesMut>;
