use std::collections::{BTreeMap, VecDeque};

use crate::net::PeerId;

/// Per-peer FIFO of raw inbound frames.
///
/// Frames from one peer are drained in arrival order; different peers can be
/// handed to different workers.
#[derive(Debug, Default)]
pub struct PeerInbox {
    queues: BTreeMap<PeerId, VecDeque<Vec<u8>>>,
}

impl PeerInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, peer: PeerId, frame: Vec<u8>) {
        self.queues.entry(peer).or_default().push_back(frame);
    }

    pub fn drain(&mut self, peer: PeerId) -> Vec<Vec<u8>> {
        self.queues
            .remove(&peer)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Peers with at least one pending frame.
    pub fn peers(&self) -> Vec<PeerId> {
        self.queues.keys().copied().collect()
    }

    pub fn remove(&mut self, peer: PeerId) -> usize {
        self.queues.remove(&peer).map_or(0, |queue| queue.len())
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
