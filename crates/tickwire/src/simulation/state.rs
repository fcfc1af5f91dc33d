use std::collections::BTreeMap;

use crate::codec::{FNV_OFFSET_BASIS, FNV_PRIME, TypeTag};

use super::allocator::IdAllocator;
use super::command::SimulationCommand;
use super::component::{Component, ComponentReference};
use super::error::SimulationError;
use super::object::{ObjectId, SimulationObject};

/// The replicated object table. Changed only through `SimulationCommand`s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Simulation {
    objects: BTreeMap<ObjectId, SimulationObject>,
    allocator: IdAllocator,
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, id: ObjectId) -> Option<&SimulationObject> {
        self.objects.get(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &SimulationObject> {
        self.objects.values()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn next_object_id(&self) -> Option<ObjectId> {
        self.allocator.peek()
    }

    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    pub fn resolve(&self, reference: ComponentReference) -> Result<&[u8], SimulationError> {
        self.object(reference.object_id)
            .ok_or(SimulationError::ObjectNotFound(reference.object_id))?
            .raw(reference.component)
            .ok_or(SimulationError::ComponentNotFound {
                object_id: reference.object_id,
                component: reference.component,
            })
    }

    pub fn component<T: Component>(&self, id: ObjectId) -> Result<T, SimulationError> {
        let bytes = self.resolve(ComponentReference::of::<T>(id))?;
        T::from_bytes(bytes).map_err(|source| SimulationError::Component {
            component: T::TYPE_TAG,
            source,
        })
    }

    pub fn apply(&mut self, command: &SimulationCommand) -> Result<(), SimulationError> {
        command.apply(self)
    }

    pub fn rollback(&mut self, command: &SimulationCommand) -> Result<(), SimulationError> {
        command.rollback(self)
    }

    pub fn create_command(&self) -> Result<SimulationCommand, SimulationError> {
        let object_id = self
            .allocator
            .peek()
            .ok_or(SimulationError::IdsExhausted)?;
        Ok(SimulationCommand::CreateObject { object_id })
    }

    pub fn destroy_command(&self, id: ObjectId) -> Result<SimulationCommand, SimulationError> {
        let object = self.object(id).ok_or(SimulationError::ObjectNotFound(id))?;
        Ok(SimulationCommand::DestroyObject {
            object_id: id,
            components: object.states(),
        })
    }

    pub fn set_command<T: Component>(
        &self,
        id: ObjectId,
        component: &T,
    ) -> Result<SimulationCommand, SimulationError> {
        self.set_raw_command(ComponentReference::of::<T>(id), component.to_bytes())
    }

    pub fn set_raw_command(
        &self,
        target: ComponentReference,
        value: Vec<u8>,
    ) -> Result<SimulationCommand, SimulationError> {
        let object = self
            .object(target.object_id)
            .ok_or(SimulationError::ObjectNotFound(target.object_id))?;
        Ok(SimulationCommand::SetComponent {
            target,
            value,
            previous: object.raw(target.component).map(<[u8]>::to_vec),
        })
    }

    pub fn remove_command(
        &self,
        target: ComponentReference,
    ) -> Result<SimulationCommand, SimulationError> {
        let previous = self.resolve(target)?.to_vec();
        Ok(SimulationCommand::RemoveComponent { target, previous })
    }

    /// Creates an object outside of any command log.
    pub fn create_object(&mut self) -> Result<ObjectId, SimulationError> {
        let command = self.create_command()?;
        command.apply(self)?;
        Ok(command.object_id())
    }

    pub fn set_component<T: Component>(
        &mut self,
        id: ObjectId,
        component: &T,
    ) -> Result<SimulationCommand, SimulationError> {
        let command = self.set_command(id, component)?;
        command.apply(self)?;
        Ok(command)
    }

    /// Commands that rebuild this exact state, allocator included, on an empty simulation.
    pub fn baseline_commands(&self) -> Vec<SimulationCommand> {
        let high_water_mark = self.allocator.high_water_mark();
        let mut commands = Vec::new();

        for raw in 0..high_water_mark {
            commands.push(SimulationCommand::CreateObject {
                object_id: ObjectId(raw as u16),
            });
        }
        for object_id in self.allocator.free_ids() {
            commands.push(SimulationCommand::DestroyObject {
                object_id,
                components: Vec::new(),
            });
        }
        for object in self.objects.values() {
            for (&component, value) in object.components() {
                commands.push(SimulationCommand::SetComponent {
                    target: ComponentReference::new(object.id(), component),
                    value: value.clone(),
                    previous: None,
                });
            }
        }

        commands
    }

    /// FNV-1a digest of the allocator and every component byte.
    pub fn checksum(&self) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        let mut feed = |bytes: &[u8]| {
            for &byte in bytes {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        };

        feed(&self.allocator.high_water_mark().to_le_bytes());
        for id in self.allocator.free_ids() {
            feed(&id.0.to_le_bytes());
        }
        for object in self.objects.values() {
            feed(&object.id().0.to_le_bytes());
            for (component, value) in object.components() {
                feed(&component.value().to_le_bytes());
                feed(&(value.len() as u32).to_le_bytes());
                feed(value);
            }
        }

        hash
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.allocator.clear();
    }

    pub(crate) fn allocator_mut(&mut self) -> &mut IdAllocator {
        &mut self.allocator
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> Result<&mut SimulationObject, SimulationError> {
        self.objects
            .get_mut(&id)
            .ok_or(SimulationError::ObjectNotFound(id))
    }

    pub(crate) fn insert_object(&mut self, object: SimulationObject) {
        self.objects.insert(object.id(), object);
    }

    pub(crate) fn remove_object(&mut self, id: ObjectId) -> Option<SimulationObject> {
        self.objects.remove(&id)
    }
}

impl ComponentReference {
    pub fn resolve<'a>(&self, simulation: &'a Simulation) -> Result<&'a [u8], SimulationError> {
        simulation.resolve(*self)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::codec::WireType;
    use crate::simulation::Transform;

    fn populated() -> Simulation {
        let mut simulation = Simulation::new();
        for i in 0..4 {
            let id = simulation.create_object().unwrap();
            simulation
                .set_component(id, &Transform::from_position(Vec3::splat(i as f32)))
                .unwrap();
        }
        let destroy = simulation.destroy_command(ObjectId(1)).unwrap();
        simulation.apply(&destroy).unwrap();
        simulation
    }

    #[test]
    fn resolve_reports_missing_parts() {
        let simulation = populated();

        assert_eq!(
            ComponentReference::of::<Transform>(ObjectId(1)).resolve(&simulation),
            Err(SimulationError::ObjectNotFound(ObjectId(1)))
        );
        assert_eq!(
            simulation.resolve(ComponentReference::new(ObjectId(0), TypeTag(1))),
            Err(SimulationError::ComponentNotFound {
                object_id: ObjectId(0),
                component: TypeTag(1)
            })
        );
        assert_eq!(
            simulation.component::<Transform>(ObjectId(2)).unwrap().position,
            Vec3::splat(2.0)
        );
    }

    #[test]
    fn baseline_rebuilds_identical_state() {
        let source = populated();
        let mut replica = Simulation::new();
        for command in source.baseline_commands() {
            replica.apply(&command).unwrap();
        }

        assert_eq!(replica, source);
        assert_eq!(replica.checksum(), source.checksum());
        assert_eq!(replica.next_object_id(), Some(ObjectId(1)));
    }

    #[test]
    fn checksum_tracks_component_bytes() {
        let mut simulation = populated();
        let before = simulation.checksum();

        simulation
            .set_component(ObjectId(0), &Transform::from_position(Vec3::X))
            .unwrap();
        assert_ne!(simulation.checksum(), before);
        assert!(simulation.object(ObjectId(0)).unwrap().has(Transform::TYPE_TAG));
    }
}
