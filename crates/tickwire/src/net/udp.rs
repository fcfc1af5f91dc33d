use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::codec::Wire;
use crate::message::MessageEnvelope;

use super::protocol::{
    ConnectionData, PeerId, Protocol, ProtocolEvent, ProtocolType, TransportError,
};
use super::stats::NetworkStats;

pub const MAX_DATAGRAM_SIZE: usize = 65_507;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HEARTBEAT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameKind {
    Connect = 1,
    Accept = 2,
    Data = 3,
    Disconnect = 4,
    Heartbeat = 5,
}

impl TryFrom<u8> for FrameKind {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Connect),
            2 => Ok(Self::Accept),
            3 => Ok(Self::Data),
            4 => Ok(Self::Disconnect),
            5 => Ok(Self::Heartbeat),
            _ => Err(TransportError::MalformedFrame),
        }
    }
}

/// What a UDP host advertises: the port it listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct UdpConnectionData {
    pub port: u16,
}

impl UdpConnectionData {
    pub fn to_connection_data(&self) -> Result<ConnectionData, rancor::Error> {
        rkyv::to_bytes::<rancor::Error>(self).map(|aligned| ConnectionData(aligned.to_vec()))
    }

    pub fn from_connection_data(data: &ConnectionData) -> Result<Self, rancor::Error> {
        let mut aligned = AlignedVec::<16>::with_capacity(data.0.len());
        aligned.extend_from_slice(&data.0);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned)
    }
}

#[derive(Debug, Clone)]
pub struct UdpConfig {
    pub bind_address: IpAddr,
    pub timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PeerState {
    /// Outgoing connection waiting for Accept. Connect is resent on every heartbeat.
    Connecting { request_data: Vec<u8> },
    Connected,
}

#[derive(Debug)]
struct UdpPeer {
    addr: SocketAddr,
    state: PeerState,
    last_receive: Instant,
    last_send: Instant,
}

/// Non-blocking UDP transport.
///
/// Every datagram is `[1 byte frame kind][payload]`; Data frames carry one
/// encoded envelope.
#[derive(Debug)]
pub struct UdpProtocol {
    config: UdpConfig,
    socket: Option<UdpSocket>,
    listening: bool,
    peers: HashMap<u32, UdpPeer>,
    by_addr: HashMap<SocketAddr, u32>,
    next_index: u32,
    stats: NetworkStats,
    recv_buffer: Vec<u8>,
}

impl Default for UdpProtocol {
    fn default() -> Self {
        Self::new(UdpConfig::default())
    }
}

impl UdpProtocol {
    pub const PROTOCOL_TYPE: ProtocolType = ProtocolType::named("tickwire::udp");

    pub fn new(config: UdpConfig) -> Self {
        Self {
            config,
            socket: None,
            listening: false,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            next_index: 0,
            stats: NetworkStats::default(),
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|socket| socket.local_addr().ok())
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn peer_addr(&self, peer: PeerId) -> Option<SocketAddr> {
        self.peers.get(&peer.index).map(|p| p.addr)
    }

    pub fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| p.state == PeerState::Connected)
            .count()
    }

    fn bind(&mut self, port: u16) -> Result<&UdpSocket, TransportError> {
        if self.socket.is_none() {
            let socket = UdpSocket::bind(SocketAddr::new(self.config.bind_address, port))?;
            socket.set_nonblocking(true)?;
            debug!("UDP socket bound to {}", socket.local_addr()?);
            self.socket = Some(socket);
        }
        self.socket.as_ref().ok_or(TransportError::Closed)
    }

    fn add_peer(&mut self, addr: SocketAddr, state: PeerState) -> PeerId {
        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        let now = Instant::now();
        self.peers.insert(
            index,
            UdpPeer {
                addr,
                state,
                last_receive: now,
                last_send: now,
            },
        );
        self.by_addr.insert(addr, index);
        PeerId::new(Self::PROTOCOL_TYPE, index)
    }

    fn remove_peer(&mut self, index: u32) -> Option<UdpPeer> {
        let peer = self.peers.remove(&index)?;
        self.by_addr.remove(&peer.addr);
        Some(peer)
    }

    fn handle_datagram(&mut self, size: usize, addr: SocketAddr, events: &mut Vec<ProtocolEvent>) {
        let index = self.by_addr.get(&addr).copied();
        let peer = index.map(|index| PeerId::new(Self::PROTOCOL_TYPE, index));

        let kind = match self.recv_buffer[..size].first().copied().map(FrameKind::try_from) {
            Some(Ok(kind)) => kind,
            Some(Err(error)) => {
                self.stats.record_dropped();
                events.push(ProtocolEvent::NetworkError { peer, error });
                return;
            }
            None => {
                self.stats.record_dropped();
                return;
            }
        };
        let payload = self.recv_buffer[1..size].to_vec();

        let known = index.and_then(|index| {
            let entry = self.peers.get_mut(&index)?;
            entry.last_receive = Instant::now();
            Some((index, entry.state.clone()))
        });

        if let Some((index, state)) = known {
            let peer = PeerId::new(Self::PROTOCOL_TYPE, index);
            match (kind, state) {
                // Data only follows an Accept, so it completes a handshake whose Accept was lost.
                (FrameKind::Accept | FrameKind::Data, PeerState::Connecting { .. }) => {
                    if let Some(p) = self.peers.get_mut(&index) {
                        p.state = PeerState::Connected;
                    }
                    info!("Connected to {}", addr);
                    events.push(ProtocolEvent::PeerConnected {
                        peer,
                        request_data: Vec::new(),
                    });
                    if kind == FrameKind::Data {
                        events.push(ProtocolEvent::Received {
                            peer,
                            bytes: payload,
                        });
                    }
                }
                // Our Accept was lost; the peer is still retrying.
                (FrameKind::Connect, PeerState::Connected) => {
                    self.send_frame(addr, FrameKind::Accept, &[]).ok();
                }
                (FrameKind::Data, PeerState::Connected) => {
                    events.push(ProtocolEvent::Received {
                        peer,
                        bytes: payload,
                    });
                }
                (FrameKind::Disconnect, _) => {
                    self.remove_peer(index);
                    events.push(ProtocolEvent::PeerDisconnected { peer });
                }
                (FrameKind::Heartbeat, _) => {}
                (kind, _) => {
                    debug!("Ignoring {:?} frame from {}", kind, addr);
                    self.stats.record_dropped();
                }
            }
            return;
        }

        match kind {
            FrameKind::Connect if self.listening => {
                let peer = self.add_peer(addr, PeerState::Connected);
                if let Err(error) = self.send_frame(addr, FrameKind::Accept, &[]) {
                    events.push(ProtocolEvent::NetworkError {
                        peer: Some(peer),
                        error,
                    });
                }
                info!("Accepted connection from {} as {}", addr, peer);
                events.push(ProtocolEvent::PeerConnected {
                    peer,
                    request_data: payload,
                });
            }
            _ => {
                debug!("Dropping {:?} frame from unknown address {}", kind, addr);
                self.stats.record_dropped();
            }
        }
    }

    fn maintain(&mut self, events: &mut Vec<ProtocolEvent>) {
        let timeout = self.config.timeout;
        let timed_out: Vec<u32> = self
            .peers
            .iter()
            .filter(|(_, p)| p.last_receive.elapsed() > timeout)
            .map(|(&index, _)| index)
            .collect();

        for index in timed_out {
            if let Some(peer) = self.remove_peer(index) {
                warn!("Connection to {} timed out", peer.addr);
                events.push(ProtocolEvent::PeerDisconnected {
                    peer: PeerId::new(Self::PROTOCOL_TYPE, index),
                });
            }
        }

        let interval = self.config.heartbeat_interval;
        let due: Vec<(SocketAddr, PeerState)> = self
            .peers
            .values()
            .filter(|p| p.last_send.elapsed() >= interval)
            .map(|p| (p.addr, p.state.clone()))
            .collect();

        for (addr, state) in due {
            let sent = match &state {
                PeerState::Connecting { request_data } => {
                    self.send_frame(addr, FrameKind::Connect, request_data)
                }
                PeerState::Connected => self.send_frame(addr, FrameKind::Heartbeat, &[]),
            };
            if let Err(error) = sent {
                let peer = self
                    .by_addr
                    .get(&addr)
                    .map(|&index| PeerId::new(Self::PROTOCOL_TYPE, index));
                events.push(ProtocolEvent::NetworkError { peer, error });
            }
        }
    }

    fn send_frame(
        &mut self,
        addr: SocketAddr,
        kind: FrameKind,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let size = payload.len() + 1;
        if size > MAX_DATAGRAM_SIZE {
            return Err(TransportError::FrameTooLarge {
                size,
                limit: MAX_DATAGRAM_SIZE,
            });
        }

        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let mut frame = Vec::with_capacity(size);
        frame.push(kind as u8);
        frame.extend_from_slice(payload);

        let bytes = socket.send_to(&frame, addr)?;
        self.stats.record_sent(bytes);
        if let Some(peer) = self.by_addr.get(&addr).and_then(|i| self.peers.get_mut(i)) {
            peer.last_send = Instant::now();
        }
        Ok(())
    }

    fn connected_addr(&self, peer: PeerId) -> Result<SocketAddr, TransportError> {
        if peer.protocol != Self::PROTOCOL_TYPE {
            return Err(TransportError::UnknownPeer(peer));
        }
        let entry = self
            .peers
            .get(&peer.index)
            .ok_or(TransportError::UnknownPeer(peer))?;
        match entry.state {
            PeerState::Connected => Ok(entry.addr),
            PeerState::Connecting { .. } => Err(TransportError::NotConnected),
        }
    }
}

impl Protocol for UdpProtocol {
    fn protocol_type(&self) -> ProtocolType {
        Self::PROTOCOL_TYPE
    }

    fn connection_data(&self) -> ConnectionData {
        let port = self.local_addr().map_or(0, |addr| addr.port());
        match (UdpConnectionData { port }).to_connection_data() {
            Ok(data) => data,
            Err(err) => {
                warn!("Failed to archive UDP connection data: {}", err);
                ConnectionData::default()
            }
        }
    }

    fn listen(&mut self, port: u16) -> Result<(), TransportError> {
        let addr = self.bind(port)?.local_addr()?;
        self.listening = true;
        info!("UDP transport listening on {}", addr);
        Ok(())
    }

    fn connect(&mut self, endpoint: &str, request_data: &[u8]) -> Result<PeerId, TransportError> {
        let addr = endpoint
            .to_socket_addrs()
            .map_err(|_| TransportError::InvalidEndpoint(endpoint.to_string()))?
            .next()
            .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))?;

        if let Some(&index) = self.by_addr.get(&addr) {
            return Ok(PeerId::new(Self::PROTOCOL_TYPE, index));
        }

        self.bind(0)?;
        let peer = self.add_peer(
            addr,
            PeerState::Connecting {
                request_data: request_data.to_vec(),
            },
        );
        if let Err(err) = self.send_frame(addr, FrameKind::Connect, request_data) {
            self.remove_peer(peer.index);
            return Err(err);
        }
        info!("Connecting to {}", addr);
        Ok(peer)
    }

    fn send(&mut self, peer: PeerId, envelope: &MessageEnvelope) -> Result<(), TransportError> {
        let addr = self.connected_addr(peer)?;
        self.send_frame(addr, FrameKind::Data, &envelope.to_bytes())
    }

    fn disconnect(&mut self, peer: PeerId) -> Result<(), TransportError> {
        if peer.protocol != Self::PROTOCOL_TYPE {
            return Err(TransportError::UnknownPeer(peer));
        }
        let addr = self
            .peers
            .get(&peer.index)
            .map(|p| p.addr)
            .ok_or(TransportError::UnknownPeer(peer))?;
        let sent = self.send_frame(addr, FrameKind::Disconnect, &[]);
        self.remove_peer(peer.index);
        sent
    }

    fn poll(&mut self) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        if self.socket.is_none() {
            return events;
        }

        loop {
            let received = match self.socket.as_ref() {
                Some(socket) => socket.recv_from(&mut self.recv_buffer),
                None => break,
            };
            match received {
                Ok((size, addr)) => {
                    self.stats.record_received(size);
                    self.handle_datagram(size, addr, &mut events);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // ICMP port unreachable surfaces here on some platforms; the timeout handles it.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    events.push(ProtocolEvent::NetworkError {
                        peer: None,
                        error: e.into(),
                    });
                    break;
                }
            }
        }

        self.maintain(&mut events);
        events
    }
}

impl Drop for UdpProtocol {
    fn drop(&mut self) {
        let addrs: Vec<SocketAddr> = self.peers.values().map(|p| p.addr).collect();
        for addr in addrs {
            self.send_frame(addr, FrameKind::Disconnect, &[]).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_kind_rejects_unknown_bytes() {
        assert_eq!(FrameKind::try_from(3).ok(), Some(FrameKind::Data));
        assert!(matches!(
            FrameKind::try_from(0),
            Err(TransportError::MalformedFrame)
        ));
    }

    #[test]
    fn connection_data_archives_port() {
        let data = UdpConnectionData { port: 27015 }.to_connection_data().unwrap();
        let restored = UdpConnectionData::from_connection_data(&data).unwrap();
        assert_eq!(restored.port, 27015);
    }

    #[test]
    fn send_requires_connection() {
        let mut udp = UdpProtocol::default();
        let peer = PeerId::new(UdpProtocol::PROTOCOL_TYPE, 3);
        let envelope = MessageEnvelope::new(
            crate::message::MessageKind::Event,
            crate::codec::TypeTag(1),
            Vec::new(),
        );
        assert!(matches!(
            udp.send(peer, &envelope),
            Err(TransportError::UnknownPeer(_))
        ));
        assert!(udp.poll().is_empty());
    }

    #[test]
    fn data_before_accept_completes_handshake() {
        let host = UdpSocket::bind("127.0.0.1:0").unwrap();
        host.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        let mut client = UdpProtocol::new(UdpConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..Default::default()
        });
        let remote = client
            .connect(&host.local_addr().unwrap().to_string(), b"hi")
            .unwrap();

        let mut buffer = [0u8; 64];
        let (size, client_addr) = host.recv_from(&mut buffer).unwrap();
        assert_eq!(&buffer[..size], &[FrameKind::Connect as u8, b'h', b'i']);

        // The Accept never arrives; the first frame the client sees is data.
        let envelope = MessageEnvelope::new(
            crate::message::MessageKind::Event,
            crate::codec::TypeTag(7),
            vec![1, 2],
        );
        let mut frame = vec![FrameKind::Data as u8];
        frame.extend_from_slice(&envelope.to_bytes());
        host.send_to(&frame, client_addr).unwrap();

        let start = Instant::now();
        let mut events = Vec::new();
        while events.is_empty() && start.elapsed() < Duration::from_millis(500) {
            events = client.poll();
            std::thread::sleep(Duration::from_millis(1));
        }

        match &events[..] {
            [
                ProtocolEvent::PeerConnected { peer: connected, .. },
                ProtocolEvent::Received { peer, bytes },
            ] => {
                assert_eq!(*connected, remote);
                assert_eq!(*peer, remote);
                assert_eq!(MessageEnvelope::from_bytes(bytes).unwrap(), envelope);
            }
            other => panic!("Expected PeerConnected then Received, got {:?}", other),
        }
        assert_eq!(client.connected_count(), 1);
    }
}
