use crate::codec::{ByteReader, ByteWriter, DecodeError, TypeTag, Wire};

use super::component::{ComponentReference, ComponentState};
use super::error::SimulationError;
use super::object::{ObjectId, SimulationObject};
use super::state::Simulation;

/// A reversible change to a simulation.
///
/// Every variant carries what it overwrites, so `rollback` can restore the
/// prior state byte for byte and `apply` can detect a peer whose state has
/// drifted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationCommand {
    CreateObject {
        object_id: ObjectId,
    },
    DestroyObject {
        object_id: ObjectId,
        components: Vec<ComponentState>,
    },
    SetComponent {
        target: ComponentReference,
        value: Vec<u8>,
        previous: Option<Vec<u8>>,
    },
    RemoveComponent {
        target: ComponentReference,
        previous: Vec<u8>,
    },
}

impl SimulationCommand {
    const CREATE_OBJECT: u8 = 0;
    const DESTROY_OBJECT: u8 = 1;
    const SET_COMPONENT: u8 = 2;
    const REMOVE_COMPONENT: u8 = 3;

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateObject { .. } => "CreateObject",
            Self::DestroyObject { .. } => "DestroyObject",
            Self::SetComponent { .. } => "SetComponent",
            Self::RemoveComponent { .. } => "RemoveComponent",
        }
    }

    pub fn object_id(&self) -> ObjectId {
        match self {
            Self::CreateObject { object_id } | Self::DestroyObject { object_id, .. } => *object_id,
            Self::SetComponent { target, .. } | Self::RemoveComponent { target, .. } => {
                target.object_id
            }
        }
    }

    /// Applies the command. Nothing is modified when an error is returned.
    pub fn apply(&self, simulation: &mut Simulation) -> Result<(), SimulationError> {
        match self {
            Self::CreateObject { object_id } => {
                let next = simulation.allocator().peek();
                if next != Some(*object_id) {
                    return Err(match next {
                        None => SimulationError::IdsExhausted,
                        actual => SimulationError::UnexpectedObjectId {
                            expected: *object_id,
                            actual,
                        },
                    });
                }
                if simulation.contains(*object_id) {
                    return Err(SimulationError::ObjectExists(*object_id));
                }
                simulation.allocator_mut().allocate();
                simulation.insert_object(SimulationObject::new(*object_id));
            }
            Self::DestroyObject {
                object_id,
                components,
            } => {
                let object = simulation
                    .object(*object_id)
                    .ok_or(SimulationError::ObjectNotFound(*object_id))?;
                if let Some(component) = first_difference(object, components) {
                    return Err(SimulationError::ComponentMismatch {
                        object_id: *object_id,
                        component,
                    });
                }
                simulation.remove_object(*object_id);
                simulation.allocator_mut().release(*object_id);
            }
            Self::SetComponent {
                target,
                value,
                previous,
            } => {
                let object = simulation.object_mut(target.object_id)?;
                if object.raw(target.component) != previous.as_deref() {
                    return Err(SimulationError::ComponentMismatch {
                        object_id: target.object_id,
                        component: target.component,
                    });
                }
                object.insert(target.component, value.clone());
            }
            Self::RemoveComponent { target, previous } => {
                let object = simulation.object_mut(target.object_id)?;
                match object.raw(target.component) {
                    None => {
                        return Err(SimulationError::ComponentNotFound {
                            object_id: target.object_id,
                            component: target.component,
                        });
                    }
                    Some(current) if current != previous.as_slice() => {
                        return Err(SimulationError::ComponentMismatch {
                            object_id: target.object_id,
                            component: target.component,
                        });
                    }
                    Some(_) => {}
                }
                object.remove(target.component);
            }
        }
        Ok(())
    }

    /// Reverses a previous `apply` of this command.
    ///
    /// Fails with `RollbackViolation`, leaving the simulation untouched, when
    /// the state is not what `apply` left behind.
    pub fn rollback(&self, simulation: &mut Simulation) -> Result<(), SimulationError> {
        let violation = |reason: String| SimulationError::RollbackViolation {
            command: self.name(),
            reason,
        };

        match self {
            Self::CreateObject { object_id } => {
                let object = simulation
                    .object(*object_id)
                    .ok_or_else(|| violation(format!("object {} does not exist", object_id)))?;
                if object.component_count() != 0 {
                    return Err(violation(format!(
                        "object {} still has {} component(s)",
                        object_id,
                        object.component_count()
                    )));
                }
                if !simulation.allocator().is_latest(*object_id) {
                    return Err(violation(format!(
                        "object {} is not the most recent allocation",
                        object_id
                    )));
                }
                simulation.remove_object(*object_id);
                simulation.allocator_mut().release(*object_id);
            }
            Self::DestroyObject {
                object_id,
                components,
            } => {
                if simulation.contains(*object_id) || simulation.allocator().is_allocated(*object_id)
                {
                    return Err(violation(format!("object {} was recreated", object_id)));
                }
                simulation.allocator_mut().reclaim(*object_id);
                let mut object = SimulationObject::new(*object_id);
                for state in components {
                    object.insert(state.type_hash, state.data.clone());
                }
                simulation.insert_object(object);
            }
            Self::SetComponent {
                target,
                value,
                previous,
            } => {
                let object = simulation
                    .object_mut(target.object_id)
                    .map_err(|err| violation(err.to_string()))?;
                if object.raw(target.component) != Some(value.as_slice()) {
                    return Err(violation(format!(
                        "component {} of object {} was changed after it was set",
                        target.component, target.object_id
                    )));
                }
                match previous {
                    Some(previous) => object.insert(target.component, previous.clone()),
                    None => object.remove(target.component),
                };
            }
            Self::RemoveComponent { target, previous } => {
                let object = simulation
                    .object_mut(target.object_id)
                    .map_err(|err| violation(err.to_string()))?;
                if object.has(target.component) {
                    return Err(violation(format!(
                        "component {} of object {} was re-added",
                        target.component, target.object_id
                    )));
                }
                object.insert(target.component, previous.clone());
            }
        }
        Ok(())
    }
}

fn first_difference(object: &SimulationObject, components: &[ComponentState]) -> Option<TypeTag> {
    for state in components {
        if object.raw(state.type_hash) != Some(state.data.as_slice()) {
            return Some(state.type_hash);
        }
    }
    object
        .components()
        .keys()
        .find(|tag| !components.iter().any(|state| state.type_hash == **tag))
        .copied()
}

impl Wire for SimulationCommand {
    fn encode(&self, writer: &mut ByteWriter) {
        match self {
            Self::CreateObject { object_id } => {
                writer.write_u8(Self::CREATE_OBJECT);
                writer.write(object_id);
            }
            Self::DestroyObject {
                object_id,
                components,
            } => {
                writer.write_u8(Self::DESTROY_OBJECT);
                writer.write(object_id);
                writer.write(components);
            }
            Self::SetComponent {
                target,
                value,
                previous,
            } => {
                writer.write_u8(Self::SET_COMPONENT);
                writer.write(target);
                writer.write_bytes(value);
                writer.write(previous);
            }
            Self::RemoveComponent { target, previous } => {
                writer.write_u8(Self::REMOVE_COMPONENT);
                writer.write(target);
                writer.write_bytes(previous);
            }
        }
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        match reader.read_u8()? {
            Self::CREATE_OBJECT => Ok(Self::CreateObject {
                object_id: reader.read()?,
            }),
            Self::DESTROY_OBJECT => Ok(Self::DestroyObject {
                object_id: reader.read()?,
                components: reader.read()?,
            }),
            Self::SET_COMPONENT => Ok(Self::SetComponent {
                target: reader.read()?,
                value: reader.read_bytes()?.to_vec(),
                previous: reader.read()?,
            }),
            Self::REMOVE_COMPONENT => Ok(Self::RemoveComponent {
                target: reader.read()?,
                previous: reader.read_bytes()?.to_vec(),
            }),
            value => Err(DecodeError::InvalidDiscriminant {
                what: "simulation command",
                value,
            }),
        }
    }
}
