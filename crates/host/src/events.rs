use tickwire::{PeerId, Tick};

#[derive(Debug, Clone)]
pub enum HostEvent {
    PeerJoined {
        peer: PeerId,
        tick: Tick,
        objects: usize,
    },
    PeerResynced {
        peer: PeerId,
        tick: Tick,
    },
    PeerLeft {
        peer: PeerId,
        reason: LeaveReason,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    Disconnected,
    Shutdown,
}

impl LeaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::Disconnected => "disconnected",
            LeaveReason::Shutdown => "dropped on shutdown",
        }
    }
}
