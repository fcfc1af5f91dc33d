//! Transport abstraction and the bundled reference transports.

mod loopback;
mod protocol;
mod set;
mod stats;
mod udp;

pub use loopback::LoopbackProtocol;
pub use protocol::{
    ConnectionData, PeerId, Protocol, ProtocolEvent, ProtocolInfo, ProtocolType, TransportError,
};
pub use set::ProtocolSet;
pub use stats::NetworkStats;
pub use udp::{MAX_DATAGRAM_SIZE, UdpConfig, UdpConnectionData, UdpProtocol};
