use crate::codec::{DecodeError, TypeTag};

use super::object::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("object {0} does not exist")]
    ObjectNotFound(ObjectId),
    #[error("object {0} already exists")]
    ObjectExists(ObjectId),
    #[error("object {object_id} has no component {component}")]
    ComponentNotFound {
        object_id: ObjectId,
        component: TypeTag,
    },
    #[error("expected to allocate object {expected} but the next free id is {actual:?}")]
    UnexpectedObjectId {
        expected: ObjectId,
        actual: Option<ObjectId>,
    },
    #[error("object id space is exhausted")]
    IdsExhausted,
    #[error("component {component} of object {object_id} differs from the recorded state")]
    ComponentMismatch {
        object_id: ObjectId,
        component: TypeTag,
    },
    #[error("cannot roll back {command}: {reason}")]
    RollbackViolation {
        command: &'static str,
        reason: String,
    },
    #[error("component {component} failed to decode: {source}")]
    Component {
        component: TypeTag,
        #[source]
        source: DecodeError,
    },
}

impl SimulationError {
    /// True for errors that leave the simulation in a state no further command can be trusted on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackViolation { .. })
    }
}
