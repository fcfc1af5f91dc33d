use std::mem;

use super::command::SimulationCommand;
use super::error::SimulationError;
use super::state::Simulation;

/// Commands applied to a simulation, undone strictly last-in first-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLog {
    applied: Vec<SimulationCommand>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `command` and records it. Failed commands are not recorded.
    pub fn apply(
        &mut self,
        simulation: &mut Simulation,
        command: SimulationCommand,
    ) -> Result<(), SimulationError> {
        command.apply(simulation)?;
        self.applied.push(command);
        Ok(())
    }

    /// Undoes the most recent command. On failure the command stays recorded.
    pub fn rollback_last(
        &mut self,
        simulation: &mut Simulation,
    ) -> Result<Option<SimulationCommand>, SimulationError> {
        let Some(command) = self.applied.pop() else {
            return Ok(None);
        };
        if let Err(err) = command.rollback(simulation) {
            self.applied.push(command);
            return Err(err);
        }
        Ok(Some(command))
    }

    /// Undoes commands until `len` remain. Returns them in the order they were undone.
    pub fn rollback_to(
        &mut self,
        simulation: &mut Simulation,
        len: usize,
    ) -> Result<Vec<SimulationCommand>, SimulationError> {
        let mut undone = Vec::with_capacity(self.applied.len().saturating_sub(len));
        while self.applied.len() > len {
            if let Some(command) = self.rollback_last(simulation)? {
                undone.push(command);
            }
        }
        Ok(undone)
    }

    pub fn rollback_all(
        &mut self,
        simulation: &mut Simulation,
    ) -> Result<Vec<SimulationCommand>, SimulationError> {
        self.rollback_to(simulation, 0)
    }

    pub fn commands(&self) -> &[SimulationCommand] {
        &self.applied
    }

    /// Forgets the recorded commands without undoing them.
    pub fn take(&mut self) -> Vec<SimulationCommand> {
        mem::take(&mut self.applied)
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn clear(&mut self) {
        self.applied.clear();
    }
}
