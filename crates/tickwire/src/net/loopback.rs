use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::codec::Wire;
use crate::message::MessageEnvelope;

use super::protocol::{
    ConnectionData, PeerId, Protocol, ProtocolEvent, ProtocolType, TransportError,
};

#[derive(Debug)]
enum Frame {
    Connect(Vec<u8>),
    Accept,
    Data(Vec<u8>),
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Host,
    Client,
}

impl Side {
    fn inbox(self) -> usize {
        match self {
            Side::Host => 0,
            Side::Client => 1,
        }
    }

    fn outbox(self) -> usize {
        1 - self.inbox()
    }
}

#[derive(Debug, Default)]
struct Link {
    queues: [VecDeque<Frame>; 2],
}

/// In-memory transport connecting exactly one host half to one client half.
///
/// Each half sees the other as peer index 0.
#[derive(Debug)]
pub struct LoopbackProtocol {
    side: Side,
    link: Arc<Mutex<Link>>,
    listening: bool,
    connected: bool,
}

impl LoopbackProtocol {
    pub const PROTOCOL_TYPE: ProtocolType = ProtocolType::named("tickwire::loopback");

    pub const REMOTE: PeerId = PeerId::new(Self::PROTOCOL_TYPE, 0);

    /// Returns the `(host, client)` halves of a fresh link.
    pub fn pair() -> (Self, Self) {
        let link = Arc::new(Mutex::new(Link::default()));
        let host = Self {
            side: Side::Host,
            link: Arc::clone(&link),
            listening: false,
            connected: false,
        };
        let client = Self {
            side: Side::Client,
            link,
            listening: false,
            connected: false,
        };
        (host, client)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, frame: Frame) {
        self.lock().queues[self.side.outbox()].push_back(frame);
    }

    fn check_peer(&self, peer: PeerId) -> Result<(), TransportError> {
        if peer != Self::REMOTE {
            return Err(TransportError::UnknownPeer(peer));
        }
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}

impl Protocol for LoopbackProtocol {
    fn protocol_type(&self) -> ProtocolType {
        Self::PROTOCOL_TYPE
    }

    fn connection_data(&self) -> ConnectionData {
        ConnectionData::default()
    }

    fn listen(&mut self, _port: u16) -> Result<(), TransportError> {
        if self.side != Side::Host {
            return Err(TransportError::InvalidEndpoint(
                "client half of a loopback link cannot listen".to_string(),
            ));
        }
        self.listening = true;
        Ok(())
    }

    fn connect(&mut self, endpoint: &str, request_data: &[u8]) -> Result<PeerId, TransportError> {
        if self.side != Side::Client {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }
        self.push(Frame::Connect(request_data.to_vec()));
        self.connected = true;
        Ok(Self::REMOTE)
    }

    fn send(&mut self, peer: PeerId, envelope: &MessageEnvelope) -> Result<(), TransportError> {
        self.check_peer(peer)?;
        self.push(Frame::Data(envelope.to_bytes()));
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerId) -> Result<(), TransportError> {
        self.check_peer(peer)?;
        self.push(Frame::Disconnect);
        self.connected = false;
        Ok(())
    }

    fn poll(&mut self) -> Vec<ProtocolEvent> {
        let frames: Vec<Frame> = self.lock().queues[self.side.inbox()].drain(..).collect();
        let mut events = Vec::with_capacity(frames.len());

        for frame in frames {
            match frame {
                Frame::Connect(request_data) => {
                    if !self.listening {
                        self.push(Frame::Disconnect);
                        events.push(ProtocolEvent::NetworkError {
                            peer: Some(Self::REMOTE),
                            error: TransportError::NotListening,
                        });
                        continue;
                    }
                    self.push(Frame::Accept);
                    self.connected = true;
                    events.push(ProtocolEvent::PeerConnected {
                        peer: Self::REMOTE,
                        request_data,
                    });
                }
                Frame::Accept => events.push(ProtocolEvent::PeerConnected {
                    peer: Self::REMOTE,
                    request_data: Vec::new(),
                }),
                // Data from a half that already hung up is stale.
                Frame::Data(bytes) if self.connected => events.push(ProtocolEvent::Received {
                    peer: Self::REMOTE,
                    bytes,
                }),
                Frame::Data(_) => debug!("Dropping loopback frame after disconnect"),
                Frame::Disconnect => {
                    if std::mem::replace(&mut self.connected, false) {
                        events.push(ProtocolEvent::PeerDisconnected { peer: Self::REMOTE });
                    }
                }
            }
        }

        events
    }
}

impl Drop for LoopbackProtocol {
    fn drop(&mut self) {
        if self.connected {
            self.push(Frame::Disconnect);
        }
    }
}
