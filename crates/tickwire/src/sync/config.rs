use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::message::MessageEnvelope;
use crate::net::MAX_DATAGRAM_SIZE;

use super::messages::SimulationTickSnapshotEvent;

pub const DEFAULT_TICK_RATE: u16 = 20;
pub const DEFAULT_HISTORY_DEPTH: usize = 256;
pub const DEFAULT_ACK_INTERVAL: u32 = 1;
pub const DEFAULT_DESYNC_THRESHOLD: u32 = 600;
/// Largest batch payload that still fits one UDP frame with its envelope.
pub const DEFAULT_MAX_BATCH_BYTES: usize = MAX_DATAGRAM_SIZE - MessageEnvelope::HEADER_LEN - 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Ticks per second.
    pub tick_rate: u16,
    /// Snapshots the host retains for peers that have not acknowledged them.
    pub history_depth: usize,
    /// Snapshots a client applies between acknowledgements.
    pub ack_interval: u32,
    /// Ticks a remote snapshot may run ahead before a total desync is reported.
    pub desync_threshold: u32,
    pub max_batch_len: usize,
    /// Encoded size cap for one batch payload.
    pub max_batch_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            history_depth: DEFAULT_HISTORY_DEPTH,
            ack_interval: DEFAULT_ACK_INTERVAL,
            desync_threshold: DEFAULT_DESYNC_THRESHOLD,
            max_batch_len: SimulationTickSnapshotEvent::MAX_LEN,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be at least 1".into()));
        }
        if self.history_depth == 0 {
            return Err(ConfigError::Invalid("history_depth must be at least 1".into()));
        }
        if self.ack_interval == 0 {
            return Err(ConfigError::Invalid("ack_interval must be at least 1".into()));
        }
        if self.max_batch_len == 0 || self.max_batch_len > SimulationTickSnapshotEvent::MAX_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_batch_len must be between 1 and {}",
                SimulationTickSnapshotEvent::MAX_LEN
            )));
        }
        if self.max_batch_bytes == 0 {
            return Err(ConfigError::Invalid("max_batch_bytes must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}
