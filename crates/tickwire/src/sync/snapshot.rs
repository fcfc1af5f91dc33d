use crate::codec::{ByteReader, ByteWriter, DecodeError, Wire};
use crate::simulation::{CommandLog, Simulation, SimulationCommand, SimulationError};

use super::tick::{Tick, TickTime};

/// Every command the host accepted during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationTickSnapshot {
    pub tick: Tick,
    pub tick_time: TickTime,
    pub commands: Vec<SimulationCommand>,
}

impl SimulationTickSnapshot {
    pub fn new(tick: Tick, tick_time: TickTime, commands: Vec<SimulationCommand>) -> Self {
        Self {
            tick,
            tick_time,
            commands,
        }
    }

    pub fn empty(tick: Tick, tick_time: TickTime) -> Self {
        Self::new(tick, tick_time, Vec::new())
    }

    /// Applies every command in order. On failure the commands already
    /// applied are rolled back and the error of the failing command is returned.
    pub fn apply(&self, simulation: &mut Simulation) -> Result<(), SimulationError> {
        let mut log = CommandLog::new();
        for command in &self.commands {
            if let Err(err) = log.apply(simulation, command.clone()) {
                log.rollback_all(simulation)?;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Undoes an applied snapshot, last command first.
    pub fn rollback(&self, simulation: &mut Simulation) -> Result<(), SimulationError> {
        for command in self.commands.iter().rev() {
            command.rollback(simulation)?;
        }
        Ok(())
    }
}

impl Wire for SimulationTickSnapshot {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write(&self.tick);
        writer.write(&self.tick_time);
        writer.write(&self.commands);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            tick: reader.read()?,
            tick_time: reader.read()?,
            commands: reader.read()?,
        })
    }
}
