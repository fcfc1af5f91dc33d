use std::collections::BTreeMap;

use log::{debug, error, info};

use crate::net::PeerId;
use crate::simulation::{
    CommandLog, Component, ComponentReference, ObjectId, Simulation, SimulationCommand,
};

use super::config::SyncConfig;
use super::error::{SessionError, SessionState};
use super::history::SnapshotHistory;
use super::messages::{
    SimulationInitEvent, SimulationTickSnapshotAckRequest, SimulationTickSnapshotAckResponse,
    SimulationTickSnapshotEvent,
};
use super::signal::{SignalObservers, SyncSignal};
use super::snapshot::SimulationTickSnapshot;
use super::tick::{Tick, TickTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeerSync {
    acknowledged: Tick,
    /// Set once history this peer still needed was evicted.
    overrun: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedTick {
    pub tick: Tick,
    pub tick_time: TickTime,
    pub commands: usize,
    pub signals: Vec<SyncSignal>,
}

/// Commands apply on submit; `end_tick` seals them into a snapshot that is
/// resent to every peer until acknowledged.
#[derive(Debug)]
pub struct HostSession {
    config: SyncConfig,
    state: SessionState,
    simulation: Simulation,
    pending: CommandLog,
    history: SnapshotHistory,
    tick: Tick,
    tick_time: TickTime,
    peers: BTreeMap<PeerId, PeerSync>,
    signals: SignalObservers,
    poisoned: Option<String>,
}

impl AsMut<HostSession> for HostSession {
    fn as_mut(&mut self) -> &mut HostSession {
        self
    }
}

impl HostSession {
    pub fn new(config: SyncConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            history: SnapshotHistory::new(config.history_depth),
            config,
            state: SessionState::Idle,
            simulation: Simulation::new(),
            pending: CommandLog::new(),
            tick: Tick::BASELINE,
            tick_time: TickTime::default(),
            peers: BTreeMap::new(),
            signals: SignalObservers::default(),
            poisoned: None,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn tick_time(&self) -> TickTime {
        self.tick_time
    }

    pub fn pending(&self) -> &[SimulationCommand] {
        self.pending.commands()
    }

    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.keys().copied()
    }

    pub fn acknowledged(&self, peer: PeerId) -> Option<Tick> {
        self.peers.get(&peer).map(|sync| sync.acknowledged)
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    pub fn on_signal<F>(&mut self, observer: F)
    where
        F: FnMut(&SyncSignal) + Send + 'static,
    {
        self.signals.push(Box::new(observer));
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.check_poisoned()?;
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                expected: SessionState::Idle,
                actual: self.state,
            });
        }
        self.state = SessionState::Running;
        info!("Host session started at {} ticks/s", self.config.tick_rate);
        Ok(())
    }

    pub fn create_object(&mut self) -> Result<ObjectId, SessionError> {
        self.ensure_running()?;
        let command = self.simulation.create_command()?;
        let id = command.object_id();
        self.submit(command)?;
        Ok(id)
    }

    pub fn destroy_object(&mut self, id: ObjectId) -> Result<(), SessionError> {
        self.ensure_running()?;
        let command = self.simulation.destroy_command(id)?;
        self.submit(command)
    }

    pub fn set_component<T: Component>(
        &mut self,
        id: ObjectId,
        component: &T,
    ) -> Result<(), SessionError> {
        self.ensure_running()?;
        let command = self.simulation.set_command(id, component)?;
        self.submit(command)
    }

    pub fn remove_component(&mut self, target: ComponentReference) -> Result<(), SessionError> {
        self.ensure_running()?;
        let command = self.simulation.remove_command(target)?;
        self.submit(command)
    }

    pub fn submit(&mut self, command: SimulationCommand) -> Result<(), SessionError> {
        self.ensure_running()?;
        self.pending.apply(&mut self.simulation, command)?;
        Ok(())
    }

    /// Capture times are kept strictly increasing even if the wall clock is not.
    pub fn end_tick(&mut self, now: TickTime) -> Result<SealedTick, SessionError> {
        self.ensure_running()?;

        let tick = self.tick.next();
        // Checked before taking the pending commands so they survive the error.
        if tick <= self.tick {
            return Err(SessionError::TickNotIncreasing {
                latest: self.tick,
                received: tick,
            });
        }
        let tick_time = if now > self.tick_time {
            now
        } else {
            TickTime(self.tick_time.0 + 1)
        };
        let snapshot = SimulationTickSnapshot::new(tick, tick_time, self.pending.take());
        let commands = snapshot.commands.len();

        let evicted = self.history.push(snapshot).map_err(|rejected| {
            SessionError::TickNotIncreasing {
                latest: self.tick,
                received: rejected.tick,
            }
        })?;
        self.tick = tick;
        self.tick_time = tick_time;

        let mut signals = Vec::new();
        if let Some(newest_evicted) = evicted.last().map(|s| s.tick) {
            for (&peer, sync) in self.peers.iter_mut() {
                if !sync.overrun && sync.acknowledged < newest_evicted {
                    sync.overrun = true;
                    signals.push(SyncSignal::HistoryOverrun {
                        peer,
                        acknowledged: sync.acknowledged,
                    });
                }
            }
        }
        for signal in &signals {
            self.signals.emit(signal);
        }

        debug!("Sealed {} with {} command(s)", tick, commands);
        Ok(SealedTick {
            tick,
            tick_time,
            commands,
            signals,
        })
    }

    /// The baseline reflects the last sealed tick; commands of the open tick
    /// reach the peer with the next snapshot.
    pub fn add_peer(&mut self, peer: PeerId) -> Result<SimulationInitEvent, SessionError> {
        self.ensure_running()?;

        let mut sealed = self.simulation.clone();
        let unwound = self
            .pending
            .commands()
            .iter()
            .rev()
            .try_for_each(|command| command.rollback(&mut sealed));
        if let Err(err) = unwound {
            return Err(self.poison(err.to_string()));
        }

        self.peers.insert(
            peer,
            PeerSync {
                acknowledged: self.tick,
                overrun: false,
            },
        );
        info!(
            "{} joined at {} with {} object(s)",
            peer,
            self.tick,
            sealed.object_count()
        );

        Ok(SimulationInitEvent {
            tick_rate: self.config.tick_rate,
            snapshot: SimulationTickSnapshot::new(
                self.tick,
                self.tick_time,
                sealed.baseline_commands(),
            ),
        })
    }

    pub fn remove_peer(&mut self, peer: PeerId) -> Result<(), SessionError> {
        self.peers
            .remove(&peer)
            .ok_or(SessionError::UnknownPeer(peer))?;
        info!("{} left", peer);
        self.prune();
        Ok(())
    }

    /// Empty for a peer whose history was overrun; it needs `add_peer` again.
    pub fn outgoing(&self, peer: PeerId) -> Result<Vec<SimulationTickSnapshotEvent>, SessionError> {
        self.ensure_running()?;
        let sync = self.peers.get(&peer).ok_or(SessionError::UnknownPeer(peer))?;
        if sync.overrun {
            return Ok(Vec::new());
        }

        let unacknowledged: Vec<SimulationTickSnapshot> =
            self.history.after(sync.acknowledged).cloned().collect();
        Ok(SimulationTickSnapshotEvent::split(
            unacknowledged,
            self.config.max_batch_len,
            self.config.max_batch_bytes,
        )?)
    }

    pub fn handle_ack(
        &mut self,
        peer: PeerId,
        request: SimulationTickSnapshotAckRequest,
    ) -> Result<SimulationTickSnapshotAckResponse, SessionError> {
        self.ensure_running()?;
        let acked = self.history.find_by_time(request.tick_time).map(|s| s.tick);
        let sync = self
            .peers
            .get_mut(&peer)
            .ok_or(SessionError::UnknownPeer(peer))?;

        match acked {
            Some(tick) if tick > sync.acknowledged => {
                sync.acknowledged = tick;
                debug!("{} acknowledged {}", peer, tick);
            }
            Some(_) => {}
            None => debug!(
                "{} acknowledged {} which is no longer retained",
                peer, request.tick_time
            ),
        }

        self.prune();
        Ok(SimulationTickSnapshotAckResponse {
            acknowledged: request.tick_time,
            retained: self.history.len() as u32,
        })
    }

    pub fn teardown(&mut self) {
        info!("Host session torn down at {}", self.tick);
        self.state = SessionState::Idle;
        self.simulation.clear();
        self.pending.clear();
        self.history.clear();
        self.peers.clear();
        self.tick = Tick::BASELINE;
        self.tick_time = TickTime::default();
        self.poisoned = None;
    }

    fn prune(&mut self) {
        let oldest_needed = self
            .peers
            .values()
            .filter(|sync| !sync.overrun)
            .map(|sync| sync.acknowledged)
            .min()
            .unwrap_or(self.tick);
        let pruned = self.history.prune_through(oldest_needed);
        if pruned > 0 {
            debug!("Pruned {} snapshot(s) through {}", pruned, oldest_needed);
        }
    }

    fn poison(&mut self, reason: String) -> SessionError {
        error!("Host session poisoned: {}", reason);
        self.poisoned = Some(reason.clone());
        SessionError::Poisoned(reason)
    }

    fn check_poisoned(&self) -> Result<(), SessionError> {
        match &self.poisoned {
            Some(reason) => Err(SessionError::Poisoned(reason.clone())),
            None => Ok(()),
        }
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        self.check_poisoned()?;
        if self.state != SessionState::Running {
            return Err(SessionError::NotRunning);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use glam::Vec3;

    use super::*;
    use crate::message::MessageEnvelope;
    use crate::codec::Wire;
    use crate::net::{MAX_DATAGRAM_SIZE, ProtocolType};
    use crate::simulation::Transform;

    fn peer(index: u32) -> PeerId {
        PeerId::new(ProtocolType::named("tests"), index)
    }

    fn running(config: SyncConfig) -> HostSession {
        let mut host = HostSession::new(config).unwrap();
        host.start().unwrap();
        host
    }

    #[test]
    fn commands_require_running_session() {
        let mut host = HostSession::new(SyncConfig::default()).unwrap();
        assert_eq!(host.create_object(), Err(SessionError::NotRunning));
        host.start().unwrap();
        assert!(matches!(
            host.start(),
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[test]
    fn end_tick_seals_pending_commands() {
        let mut host = running(SyncConfig::default());
        let id = host.create_object().unwrap();
        host.set_component(id, &Transform::from_position(Vec3::X))
            .unwrap();

        let sealed = host.end_tick(TickTime(100)).unwrap();
        assert_eq!(sealed.tick, Tick(1));
        assert_eq!(sealed.commands, 2);
        assert!(host.pending().is_empty());

        let again = host.end_tick(TickTime(50)).unwrap();
        assert_eq!(again.tick_time, TickTime(101));
    }

    #[test]
    fn baseline_excludes_open_tick() {
        let mut host = running(SyncConfig::default());
        host.create_object().unwrap();
        host.end_tick(TickTime(1)).unwrap();
        host.create_object().unwrap();

        let init = host.add_peer(peer(0)).unwrap();
        assert_eq!(init.tick_rate, 20);
        assert_eq!(init.snapshot.tick, Tick(1));
        assert_eq!(init.snapshot.commands.len(), 1);
        assert_eq!(host.simulation().object_count(), 2);
    }

    #[test]
    fn outgoing_resends_until_acknowledged() {
        let mut host = running(SyncConfig {
            max_batch_len: 2,
            ..Default::default()
        });
        host.add_peer(peer(0)).unwrap();
        for time in 1..=3 {
            host.end_tick(TickTime(time)).unwrap();
        }

        let batches = host.outgoing(peer(0)).unwrap();
        assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![2, 1]);

        let response = host
            .handle_ack(
                peer(0),
                SimulationTickSnapshotAckRequest {
                    tick_time: TickTime(2),
                },
            )
            .unwrap();
        assert_eq!(response.retained, 1);
        assert_eq!(host.acknowledged(peer(0)), Some(Tick(2)));

        let batches = host.outgoing(peer(0)).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].snapshots()[0].tick, Tick(3));
    }

    #[test]
    fn history_is_pruned_through_slowest_peer() {
        let mut host = running(SyncConfig::default());
        host.add_peer(peer(0)).unwrap();
        host.add_peer(peer(1)).unwrap();
        for time in 1..=4 {
            host.end_tick(TickTime(time)).unwrap();
        }

        let ack = |time| SimulationTickSnapshotAckRequest {
            tick_time: TickTime(time),
        };
        host.handle_ack(peer(0), ack(4)).unwrap();
        assert_eq!(host.history().len(), 4);

        host.handle_ack(peer(1), ack(2)).unwrap();
        assert_eq!(host.history().len(), 2);

        host.remove_peer(peer(1)).unwrap();
        assert!(host.history().is_empty());
        assert_eq!(
            host.remove_peer(peer(1)),
            Err(SessionError::UnknownPeer(peer(1)))
        );
    }

    #[test]
    fn eviction_signals_history_overrun() {
        let mut host = running(SyncConfig {
            history_depth: 2,
            ..Default::default()
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        host.on_signal(move |signal| sink.lock().unwrap().push(*signal));
        host.add_peer(peer(7)).unwrap();

        host.end_tick(TickTime(1)).unwrap();
        host.end_tick(TickTime(2)).unwrap();
        let sealed = host.end_tick(TickTime(3)).unwrap();

        let expected = SyncSignal::HistoryOverrun {
            peer: peer(7),
            acknowledged: Tick::BASELINE,
        };
        assert_eq!(sealed.signals, vec![expected]);
        assert_eq!(*seen.lock().unwrap(), vec![expected]);
        assert!(host.outgoing(peer(7)).unwrap().is_empty());

        // A fresh init clears the overrun.
        let init = host.add_peer(peer(7)).unwrap();
        assert_eq!(init.snapshot.tick, Tick(3));
        assert!(host.end_tick(TickTime(4)).unwrap().signals.is_empty());
        assert_eq!(host.outgoing(peer(7)).unwrap().len(), 1);
    }

    #[test]
    fn teardown_returns_to_idle() {
        let mut host = running(SyncConfig::default());
        host.create_object().unwrap();
        host.end_tick(TickTime(1)).unwrap();
        host.teardown();

        assert_eq!(host.state(), SessionState::Idle);
        assert!(host.history().is_empty());
        assert!(host.simulation().is_empty());
        assert_eq!(host.tick(), Tick::BASELINE);
    }

    #[test]
    fn lagging_peer_batches_fit_a_datagram() {
        let mut host = running(SyncConfig::default());
        let ids: Vec<ObjectId> = (0..16).map(|_| host.create_object().unwrap()).collect();
        host.add_peer(peer(0)).unwrap();

        for time in 1..=150u64 {
            for &id in &ids {
                let position = Vec3::new(time as f32, id.0 as f32, 0.0);
                host.set_component(id, &Transform::from_position(position))
                    .unwrap();
            }
            host.end_tick(TickTime(time)).unwrap();
        }

        let batches = host.outgoing(peer(0)).unwrap();
        assert!(batches.len() > 1);
        assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), 150);
        for batch in &batches {
            let frame = 1 + MessageEnvelope::event(batch).to_bytes().len();
            assert!(frame <= MAX_DATAGRAM_SIZE, "{} byte frame", frame);
        }
    }

    #[test]
    fn end_tick_keeps_pending_commands_on_error() {
        let mut host = running(SyncConfig::default());
        host.tick = Tick(u32::MAX);
        host.create_object().unwrap();

        assert!(matches!(
            host.end_tick(TickTime(1)),
            Err(SessionError::TickNotIncreasing { .. })
        ));
        assert_eq!(host.pending().len(), 1);
        assert_eq!(host.tick(), Tick(u32::MAX));
        assert!(host.history().is_empty());
    }

    #[test]
    fn failed_baseline_rollback_poisons_session() {
        let mut host = running(SyncConfig::default());
        let id = host.create_object().unwrap();
        host.end_tick(TickTime(1)).unwrap();
        host.set_component(id, &Transform::from_position(Vec3::X))
            .unwrap();

        // Diverge the live state from what the pending log recorded.
        let diverged = host
            .simulation
            .set_command(id, &Transform::from_position(Vec3::Y))
            .unwrap();
        host.simulation.apply(&diverged).unwrap();

        assert!(matches!(
            host.add_peer(peer(0)),
            Err(SessionError::Poisoned(_))
        ));
        assert!(host.is_poisoned());
        assert!(host.peers().next().is_none());
        assert!(matches!(
            host.end_tick(TickTime(2)),
            Err(SessionError::Poisoned(_))
        ));
        assert!(matches!(
            host.create_object(),
            Err(SessionError::Poisoned(_))
        ));
        assert!(matches!(host.start(), Err(SessionError::Poisoned(_))));

        host.teardown();
        assert!(!host.is_poisoned());
        host.start().unwrap();
        assert_eq!(host.create_object().unwrap(), ObjectId(0));
    }
}
