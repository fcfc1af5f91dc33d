use crate::error::ConfigError;
use crate::net::PeerId;
use crate::simulation::SimulationError;

use super::messages::BatchError;
use super::tick::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("operation requires {expected:?} but the session is {actual:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },
    #[error("session is not running")]
    NotRunning,
    #[error("session is poisoned by a failed rollback: {0}")]
    Poisoned(String),
    #[error("unknown {0}")]
    UnknownPeer(PeerId),
    #[error("{received} does not follow {latest}")]
    TickNotIncreasing { latest: Tick, received: Tick },
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
