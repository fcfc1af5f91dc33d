//! Tick snapshot replication between one host and its clients.
//!
//! The host seals the commands of every tick into a snapshot and keeps each
//! snapshot until all peers acknowledged it. Clients apply snapshots strictly
//! in tick order on top of the baseline from their init event.

mod client;
mod config;
mod error;
mod history;
mod host;
mod messages;
mod signal;
mod snapshot;
mod tick;

pub use client::{BatchReport, ClientSession};
pub use config::{
    DEFAULT_ACK_INTERVAL, DEFAULT_DESYNC_THRESHOLD, DEFAULT_HISTORY_DEPTH,
    DEFAULT_MAX_BATCH_BYTES, DEFAULT_TICK_RATE, SyncConfig,
};
pub use error::{SessionError, SessionState};
pub use history::SnapshotHistory;
pub use host::{HostSession, SealedTick};
pub use messages::{
    BatchError, SimulationInitEvent, SimulationTickSnapshotAckRequest,
    SimulationTickSnapshotAckResponse, SimulationTickSnapshotEvent,
};
pub use signal::SyncSignal;
pub use snapshot::SimulationTickSnapshot;
pub use tick::{Tick, TickTime};

use crate::error::ConfigError;
use crate::message::MessageRegistryBuilder;

/// Registers the host's handler for snapshot acknowledgements.
pub fn register_host_messages<C>(builder: &mut MessageRegistryBuilder<C>) -> Result<(), ConfigError>
where
    C: AsMut<HostSession> + 'static,
{
    builder.request::<SimulationTickSnapshotAckRequest, _>(|ctx: &mut C, peer, request| {
        Ok(ctx.as_mut().handle_ack(peer, request)?)
    })?;
    Ok(())
}

/// Registers the client's handlers for init events, snapshot batches and ack responses.
///
/// Signals raised while applying a batch reach the session's `on_signal` observers.
pub fn register_client_messages<C>(
    builder: &mut MessageRegistryBuilder<C>,
) -> Result<(), ConfigError>
where
    C: AsMut<ClientSession> + 'static,
{
    builder
        .event::<SimulationInitEvent, _>(|ctx: &mut C, _, init| {
            Ok(ctx.as_mut().handle_init(init)?)
        })?
        .event::<SimulationTickSnapshotEvent, _>(|ctx: &mut C, _, batch| {
            ctx.as_mut().handle_batch(batch)?;
            Ok(())
        })?
        .response::<SimulationTickSnapshotAckResponse, _>(|ctx: &mut C, _, response| {
            ctx.as_mut().handle_ack_response(response);
            Ok(())
        })?;
    Ok(())
}
