use std::collections::BTreeMap;
use std::fmt;

use crate::codec::{ByteReader, ByteWriter, DecodeError, TypeTag, Wire};

use super::component::{Component, ComponentState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u16);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Wire for ObjectId {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u16(self.0);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_u16().map(Self)
    }
}

/// An object owned by a simulation. Components are kept encoded, keyed by type hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationObject {
    id: ObjectId,
    components: BTreeMap<TypeTag, Vec<u8>>,
}

impl SimulationObject {
    pub(crate) fn new(id: ObjectId) -> Self {
        Self {
            id,
            components: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn has(&self, component: TypeTag) -> bool {
        self.components.contains_key(&component)
    }

    pub fn raw(&self, component: TypeTag) -> Option<&[u8]> {
        self.components.get(&component).map(Vec::as_slice)
    }

    /// Decodes the component of type `T`, if present.
    pub fn component<T: Component>(&self) -> Option<Result<T, DecodeError>> {
        self.raw(T::TYPE_TAG).map(T::from_bytes)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn states(&self) -> Vec<ComponentState> {
        self.components
            .iter()
            .map(|(&tag, data)| ComponentState::new(tag, data.clone()))
            .collect()
    }

    pub(crate) fn insert(&mut self, component: TypeTag, data: Vec<u8>) -> Option<Vec<u8>> {
        self.components.insert(component, data)
    }

    pub(crate) fn remove(&mut self, component: TypeTag) -> Option<Vec<u8>> {
        self.components.remove(&component)
    }

    pub(crate) fn components(&self) -> &BTreeMap<TypeTag, Vec<u8>> {
        &self.components
    }
}
