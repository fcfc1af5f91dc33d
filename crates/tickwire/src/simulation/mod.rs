//! Object table and the reversible commands that change it.

mod allocator;
mod command;
mod command_log;
mod component;
mod error;
mod object;
mod state;

pub use allocator::IdAllocator;
pub use command::SimulationCommand;
pub use command_log::CommandLog;
pub use component::{Component, ComponentReference, ComponentState, Transform};
pub use error::SimulationError;
pub use object::{ObjectId, SimulationObject};
pub use state::Simulation;
