use log::{debug, error, info};

use crate::simulation::{CommandLog, Simulation, SimulationCommand};

use super::config::SyncConfig;
use super::error::{SessionError, SessionState};
use super::messages::{
    SimulationInitEvent, SimulationTickSnapshotAckRequest, SimulationTickSnapshotAckResponse,
    SimulationTickSnapshotEvent,
};
use super::signal::{SignalObservers, SyncSignal};
use super::tick::{Tick, TickTime};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub skipped: usize,
    pub dropped_predictions: usize,
    pub signals: Vec<SyncSignal>,
}

/// Authoritative snapshots always apply on the unpredicted state: local
/// predictions are rolled back first and replayed afterwards.
#[derive(Debug)]
pub struct ClientSession {
    config: SyncConfig,
    state: SessionState,
    simulation: Simulation,
    predictions: CommandLog,
    tick: Tick,
    tick_time: TickTime,
    tick_rate: u16,
    since_ack: u32,
    last_response: Option<SimulationTickSnapshotAckResponse>,
    signals: SignalObservers,
    poisoned: Option<String>,
}

impl AsMut<ClientSession> for ClientSession {
    fn as_mut(&mut self) -> &mut ClientSession {
        self
    }
}

impl ClientSession {
    pub fn new(config: SyncConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            tick_rate: config.tick_rate,
            config,
            state: SessionState::Idle,
            simulation: Simulation::new(),
            predictions: CommandLog::new(),
            tick: Tick::BASELINE,
            tick_time: TickTime::default(),
            since_ack: 0,
            last_response: None,
            signals: SignalObservers::default(),
            poisoned: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn tick_time(&self) -> TickTime {
        self.tick_time
    }

    pub fn tick_rate(&self) -> u16 {
        self.tick_rate
    }

    pub fn predictions(&self) -> &[SimulationCommand] {
        self.predictions.commands()
    }

    pub fn last_ack_response(&self) -> Option<SimulationTickSnapshotAckResponse> {
        self.last_response
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

    pub fn begin(&mut self) -> Result<(), SessionError> {
        self.check_poisoned()?;
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                expected: SessionState::Idle,
                actual: self.state,
            });
        }
        self.state = SessionState::Initializing;
        Ok(())
    }

    /// Also accepted while running, to resynchronize after a history overrun.
    pub fn handle_init(&mut self, init: SimulationInitEvent) -> Result<(), SessionError> {
        self.check_poisoned()?;
        self.state = SessionState::Initializing;
        self.simulation.clear();
        self.predictions.clear();

        if let Err(err) = init.snapshot.apply(&mut self.simulation) {
            self.state = SessionState::Idle;
            self.simulation.clear();
            return Err(err.into());
        }

        self.tick = init.snapshot.tick;
        self.tick_time = init.snapshot.tick_time;
        self.tick_rate = init.tick_rate;
        self.since_ack = 0;
        self.state = SessionState::Running;
        info!(
            "Initialized at {} ({} ticks/s, {} object(s))",
            self.tick,
            self.tick_rate,
            self.simulation.object_count()
        );
        Ok(())
    }

    /// Snapshots already applied are skipped. A gap or a remote tick beyond
    /// the desync threshold stops processing at that snapshot and is
    /// reported as a signal. Snapshots applied before a failure stay applied.
    pub fn handle_batch(
        &mut self,
        batch: SimulationTickSnapshotEvent,
    ) -> Result<BatchReport, SessionError> {
        self.ensure_running()?;

        let predictions = match self.predictions.rollback_all(&mut self.simulation) {
            Ok(mut undone) => {
                undone.reverse();
                undone
            }
            Err(err) => return Err(self.poison(err.to_string())),
        };

        let mut report = BatchReport::default();
        let mut failure = None;

        for snapshot in batch.into_snapshots() {
            if snapshot.tick <= self.tick {
                report.skipped += 1;
                continue;
            }
            if snapshot.tick.distance_from(self.tick) > self.config.desync_threshold {
                report.signals.push(SyncSignal::TotalDesync {
                    local: self.tick,
                    remote: snapshot.tick,
                });
                break;
            }
            if snapshot.tick != self.tick.next() {
                report.signals.push(SyncSignal::TickGap {
                    expected: self.tick.next(),
                    received: snapshot.tick,
                });
                break;
            }

            match snapshot.apply(&mut self.simulation) {
                Ok(()) => {
                    self.tick = snapshot.tick;
                    self.tick_time = snapshot.tick_time;
                    self.since_ack += 1;
                    report.applied += 1;
                }
                Err(err) if err.is_fatal() => return Err(self.poison(err.to_string())),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        for command in predictions {
            if let Err(err) = self.predictions.apply(&mut self.simulation, command) {
                debug!("Dropped prediction: {}", err);
                report.dropped_predictions += 1;
            }
        }

        for signal in &report.signals {
            self.signals.emit(signal);
        }
        if let Some(err) = failure {
            return Err(err.into());
        }

        debug!(
            "Applied {} snapshot(s) up to {}, skipped {}",
            report.applied, self.tick, report.skipped
        );
        Ok(report)
    }

    pub fn predict(&mut self, command: SimulationCommand) -> Result<(), SessionError> {
        self.ensure_running()?;
        self.predictions.apply(&mut self.simulation, command)?;
        Ok(())
    }

    pub fn clear_predictions(&mut self) -> Result<(), SessionError> {
        self.check_poisoned()?;
        if let Err(err) = self.predictions.rollback_all(&mut self.simulation) {
            return Err(self.poison(err.to_string()));
        }
        Ok(())
    }

    pub fn take_ack(&mut self) -> Option<SimulationTickSnapshotAckRequest> {
        if self.state != SessionState::Running || self.since_ack < self.config.ack_interval {
            return None;
        }
        self.since_ack = 0;
        Some(SimulationTickSnapshotAckRequest {
            tick_time: self.tick_time,
        })
    }

    pub fn handle_ack_response(&mut self, response: SimulationTickSnapshotAckResponse) {
        debug!(
            "Host confirmed {} and retains {} snapshot(s)",
            response.acknowledged, response.retained
        );
        self.last_response = Some(response);
    }

    pub fn teardown(&mut self) {
        info!("Client session torn down at {}", self.tick);
        self.state = SessionState::Idle;
        self.simulation.clear();
        self.predictions.clear();
        self.tick = Tick::BASELINE;
        self.tick_time = TickTime::default();
        self.since_ack = 0;
        self.last_response = None;
        self.poisoned = None;
    }

    fn poison(&mut self, reason: String) -> SessionError {
        error!("Client session poisoned: {}", reason);
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
    use super::*;
    use crate::simulation::ObjectId;
    use crate::sync::SimulationTickSnapshot;

    fn create(id: u16) -> SimulationCommand {
        SimulationCommand::CreateObject {
            object_id: ObjectId(id),
        }
    }

    fn snapshot(tick: u32, commands: Vec<SimulationCommand>) -> SimulationTickSnapshot {
        SimulationTickSnapshot::new(Tick(tick), TickTime(tick as u64 * 10), commands)
    }

    fn batch(snapshots: Vec<SimulationTickSnapshot>) -> SimulationTickSnapshotEvent {
        SimulationTickSnapshotEvent::try_from_vec(snapshots).unwrap()
    }

    fn running() -> ClientSession {
        let mut client = ClientSession::new(SyncConfig::default()).unwrap();
        client.begin().unwrap();
        client
            .handle_init(SimulationInitEvent {
                tick_rate: 20,
                snapshot: SimulationTickSnapshot::empty(Tick::BASELINE, TickTime(0)),
            })
            .unwrap();
        client
    }

    #[test]
    fn batch_before_init_is_rejected() {
        let mut client = ClientSession::new(SyncConfig::default()).unwrap();
        assert_eq!(
            client.handle_batch(SimulationTickSnapshotEvent::new()),
            Err(SessionError::NotRunning)
        );
    }

    #[test]
    fn duplicates_are_skipped() {
        let mut client = running();
        client
            .handle_batch(batch(vec![snapshot(1, vec![create(0)])]))
            .unwrap();

        let report = client
            .handle_batch(batch(vec![snapshot(1, vec![create(0)]), snapshot(2, vec![])]))
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(client.tick(), Tick(2));
        assert_eq!(client.simulation().object_count(), 1);
    }

    #[test]
    fn gap_stops_processing() {
        let mut client = running();
        let report = client
            .handle_batch(batch(vec![snapshot(1, vec![]), snapshot(3, vec![create(0)])]))
            .unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(
            report.signals,
            vec![SyncSignal::TickGap {
                expected: Tick(2),
                received: Tick(3)
            }]
        );
        assert!(client.simulation().is_empty());
    }

    #[test]
    fn far_ahead_tick_is_total_desync() {
        let mut client = ClientSession::new(SyncConfig {
            desync_threshold: 10,
            ..Default::default()
        })
        .unwrap();
        client
            .handle_init(SimulationInitEvent {
                tick_rate: 20,
                snapshot: SimulationTickSnapshot::empty(Tick::BASELINE, TickTime(0)),
            })
            .unwrap();

        let report = client.handle_batch(batch(vec![snapshot(50, vec![])])).unwrap();
        assert!(matches!(report.signals.as_slice(), [SyncSignal::TotalDesync { .. }]));
        assert_eq!(client.tick(), Tick::BASELINE);
    }

    #[test]
    fn predictions_are_replayed_over_authoritative_state() {
        let mut client = running();
        client.predict(create(0)).unwrap();
        assert_eq!(client.simulation().object_count(), 1);

        // The host created object 0 itself; the prediction no longer applies.
        let report = client
            .handle_batch(batch(vec![snapshot(1, vec![create(0)])]))
            .unwrap();
        assert_eq!(report.dropped_predictions, 1);
        assert!(client.predictions().is_empty());
        assert_eq!(client.simulation().object_count(), 1);
    }

    #[test]
    fn mismatch_is_reported_and_predictions_survive() {
        let mut client = running();
        client.predict(create(0)).unwrap();

        let result = client.handle_batch(batch(vec![snapshot(1, vec![create(4)])]));
        assert!(matches!(result, Err(SessionError::Simulation(_))));
        assert_eq!(client.tick(), Tick::BASELINE);
        assert_eq!(client.predictions().len(), 1);
        assert!(!client.is_poisoned());
    }

    #[test]
    fn ack_follows_interval() {
        let mut client = ClientSession::new(SyncConfig {
            ack_interval: 2,
            ..Default::default()
        })
        .unwrap();
        client
            .handle_init(SimulationInitEvent {
                tick_rate: 30,
                snapshot: SimulationTickSnapshot::empty(Tick::BASELINE, TickTime(0)),
            })
            .unwrap();
        assert_eq!(client.tick_rate(), 30);

        client.handle_batch(batch(vec![snapshot(1, vec![])])).unwrap();
        assert_eq!(client.take_ack(), None);

        client.handle_batch(batch(vec![snapshot(2, vec![])])).unwrap();
        assert_eq!(
            client.take_ack(),
            Some(SimulationTickSnapshotAckRequest {
                tick_time: TickTime(20)
            })
        );
        assert_eq!(client.take_ack(), None);
    }

    #[test]
    fn teardown_returns_to_idle() {
        let mut client = running();
        client
            .handle_batch(batch(vec![snapshot(1, vec![create(0)])]))
            .unwrap();
        client.teardown();

        assert_eq!(client.state(), SessionState::Idle);
        assert!(client.simulation().is_empty());
        assert_eq!(client.tick(), Tick::BASELINE);
        assert!(client.begin().is_ok());
    }

    #[test]
    fn failed_prediction_rollback_poisons_session() {
        let mut client = running();
        client.predict(create(0)).unwrap();
        // An allocation behind the prediction log's back.
        client.simulation.create_object().unwrap();

        assert!(matches!(
            client.handle_batch(batch(vec![snapshot(1, vec![])])),
            Err(SessionError::Poisoned(_))
        ));
        assert!(client.is_poisoned());
        assert_eq!(client.tick(), Tick::BASELINE);
        assert!(matches!(
            client.predict(create(2)),
            Err(SessionError::Poisoned(_))
        ));
        assert!(matches!(
            client.handle_batch(batch(vec![snapshot(1, vec![])])),
            Err(SessionError::Poisoned(_))
        ));
        assert!(matches!(
            client.clear_predictions(),
            Err(SessionError::Poisoned(_))
        ));

        client.teardown();
        assert!(!client.is_poisoned());
        client.begin().unwrap();
        client
            .handle_init(SimulationInitEvent {
                tick_rate: 20,
                snapshot: snapshot(4, vec![create(0)]),
            })
            .unwrap();
        assert_eq!(client.tick(), Tick(4));
        assert_eq!(client.simulation().object_count(), 1);
    }
}
