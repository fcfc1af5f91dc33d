use std::fmt;
use std::io;

use crate::codec::{ByteReader, ByteWriter, DecodeError, Wire, type_hash};
use crate::message::MessageEnvelope;

/// Identifies a transport implementation. Derived from the transport's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolType(pub u64);

impl ProtocolType {
    pub const fn named(name: &str) -> Self {
        Self(type_hash(name))
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl Wire for ProtocolType {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.0);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_u64().map(Self)
    }
}

/// Opaque, transport-defined data a client needs to reach a listening host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionData(pub Vec<u8>);

impl ConnectionData {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// What a host advertises for one of its transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub protocol_type: ProtocolType,
    pub connection_data: ConnectionData,
}

impl Wire for ProtocolInfo {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write(&self.protocol_type);
        writer.write_bytes(&self.connection_data.0);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            protocol_type: reader.read()?,
            connection_data: ConnectionData(reader.read_bytes()?.to_vec()),
        })
    }
}

/// A remote endpoint as seen by one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId {
    pub protocol: ProtocolType,
    pub index: u32,
}

impl PeerId {
    pub const fn new(protocol: ProtocolType, index: u32) -> Self {
        Self { protocol, index }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer {}@{:016x}", self.index, self.protocol.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown {0}")]
    UnknownPeer(PeerId),
    #[error("no transport registered for protocol {0}")]
    UnknownProtocol(ProtocolType),
    #[error("transport is not listening")]
    NotListening,
    #[error("transport is not connected")]
    NotConnected,
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("malformed frame")]
    MalformedFrame,
    #[error("transport is closed")]
    Closed,
}

#[derive(Debug)]
pub enum ProtocolEvent {
    PeerConnected { peer: PeerId, request_data: Vec<u8> },
    PeerDisconnected { peer: PeerId },
    Received { peer: PeerId, bytes: Vec<u8> },
    NetworkError {
        peer: Option<PeerId>,
        error: TransportError,
    },
}

/// A transport capable of carrying envelopes between peers.
///
/// All calls are non-blocking. Inbound traffic and lifecycle changes are
/// collected by `poll`.
pub trait Protocol: Send {
    fn protocol_type(&self) -> ProtocolType;

    fn connection_data(&self) -> ConnectionData;

    fn listen(&mut self, port: u16) -> Result<(), TransportError>;

    fn connect(&mut self, endpoint: &str, request_data: &[u8]) -> Result<PeerId, TransportError>;

    fn send(&mut self, peer: PeerId, envelope: &MessageEnvelope) -> Result<(), TransportError>;

    fn disconnect(&mut self, peer: PeerId) -> Result<(), TransportError>;

    fn poll(&mut self) -> Vec<ProtocolEvent>;
}
