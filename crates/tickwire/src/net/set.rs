use std::collections::BTreeMap;

use log::{info, warn};

use crate::error::ConfigError;
use crate::message::MessageEnvelope;

use super::protocol::{PeerId, Protocol, ProtocolEvent, ProtocolInfo, ProtocolType, TransportError};

type PeerCallback = Box<dyn FnMut(PeerId, &[u8]) + Send>;
type DisconnectCallback = Box<dyn FnMut(PeerId) + Send>;
type ErrorCallback = Box<dyn FnMut(Option<PeerId>, &TransportError) + Send>;

/// The transports of one session, keyed by protocol type.
#[derive(Default)]
pub struct ProtocolSet {
    protocols: BTreeMap<ProtocolType, Box<dyn Protocol>>,
    connected: Vec<PeerCallback>,
    disconnected: Vec<DisconnectCallback>,
    errors: Vec<ErrorCallback>,
}

impl ProtocolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Protocol + 'static>(&mut self, protocol: P) -> Result<(), ConfigError> {
        let protocol_type = protocol.protocol_type();
        if self.protocols.contains_key(&protocol_type) {
            return Err(ConfigError::DuplicateProtocol(protocol_type));
        }
        self.protocols.insert(protocol_type, Box::new(protocol));
        Ok(())
    }

    pub fn contains(&self, protocol_type: ProtocolType) -> bool {
        self.protocols.contains_key(&protocol_type)
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Starts every registered transport listening on `port`.
    pub fn listen(&mut self, port: u16) -> Result<(), TransportError> {
        for protocol in self.protocols.values_mut() {
            protocol.listen(port)?;
        }
        info!("Listening on port {} with {} protocol(s)", port, self.protocols.len());
        Ok(())
    }

    pub fn connect(
        &mut self,
        protocol_type: ProtocolType,
        endpoint: &str,
        request_data: &[u8],
    ) -> Result<PeerId, TransportError> {
        self.protocol_mut(protocol_type)?
            .connect(endpoint, request_data)
    }

    pub fn send(&mut self, peer: PeerId, envelope: &MessageEnvelope) -> Result<(), TransportError> {
        self.protocol_mut(peer.protocol)?.send(peer, envelope)
    }

    pub fn disconnect(&mut self, peer: PeerId) -> Result<(), TransportError> {
        self.protocol_mut(peer.protocol)?.disconnect(peer)
    }

    /// Connection info for every transport, for publication by a discovery service.
    pub fn advertise(&self) -> Vec<ProtocolInfo> {
        self.protocols
            .values()
            .map(|protocol| ProtocolInfo {
                protocol_type: protocol.protocol_type(),
                connection_data: protocol.connection_data(),
            })
            .collect()
    }

    pub fn on_peer_connected<F>(&mut self, callback: F)
    where
        F: FnMut(PeerId, &[u8]) + Send + 'static,
    {
        self.connected.push(Box::new(callback));
    }

    pub fn on_peer_disconnected<F>(&mut self, callback: F)
    where
        F: FnMut(PeerId) + Send + 'static,
    {
        self.disconnected.push(Box::new(callback));
    }

    pub fn on_network_error<F>(&mut self, callback: F)
    where
        F: FnMut(Option<PeerId>, &TransportError) + Send + 'static,
    {
        self.errors.push(Box::new(callback));
    }

    /// Polls every transport, fires the lifecycle callbacks and returns all events in arrival order.
    pub fn poll(&mut self) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        for protocol in self.protocols.values_mut() {
            events.extend(protocol.poll());
        }

        for event in &events {
            match event {
                ProtocolEvent::PeerConnected { peer, request_data } => {
                    info!("{} connected", peer);
                    for callback in &mut self.connected {
                        callback(*peer, request_data);
                    }
                }
                ProtocolEvent::PeerDisconnected { peer } => {
                    info!("{} disconnected", peer);
                    for callback in &mut self.disconnected {
                        callback(*peer);
                    }
                }
                ProtocolEvent::NetworkError { peer, error } => {
                    warn!("Network error ({:?}): {}", peer, error);
                    for callback in &mut self.errors {
                        callback(*peer, error);
                    }
                }
                ProtocolEvent::Received { .. } => {}
            }
        }

        events
    }

    fn protocol_mut(
        &mut self,
        protocol_type: ProtocolType,
    ) -> Result<&mut Box<dyn Protocol>, TransportError> {
        self.protocols
            .get_mut(&protocol_type)
            .ok_or(TransportError::UnknownProtocol(protocol_type))
    }
}
