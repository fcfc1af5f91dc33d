use glam::{Quat, Vec3};

use crate::codec::{ByteReader, ByteWriter, DecodeError, TypeTag, Wire, WireType};

use super::object::ObjectId;

/// A piece of object state that is replicated by its encoded bytes.
pub trait Component: Wire + WireType {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

impl WireType for Transform {
    const TYPE_NAME: &'static str = "tickwire::Transform";
}

impl Component for Transform {}

impl Wire for Transform {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write(&self.position);
        writer.write(&self.rotation);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            position: reader.read()?,
            rotation: reader.read()?,
        })
    }
}

/// A component in its encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentState {
    pub type_hash: TypeTag,
    pub data: Vec<u8>,
}

impl ComponentState {
    pub fn new(type_hash: TypeTag, data: Vec<u8>) -> Self {
        Self { type_hash, data }
    }

    pub fn encode<T: Component>(component: &T) -> Self {
        Self::new(T::TYPE_TAG, component.to_bytes())
    }

    pub fn decode<T: Component>(&self) -> Option<Result<T, DecodeError>> {
        (self.type_hash == T::TYPE_TAG).then(|| T::from_bytes(&self.data))
    }
}

impl Wire for ComponentState {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write(&self.type_hash);
        writer.write_bytes(&self.data);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            type_hash: reader.read()?,
            data: reader.read_bytes()?.to_vec(),
        })
    }
}

/// Lookup key for one component of one object. Never keeps the object alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentReference {
    pub object_id: ObjectId,
    pub component: TypeTag,
}

impl ComponentReference {
    pub fn new(object_id: ObjectId, component: TypeTag) -> Self {
        Self {
            object_id,
            component,
        }
    }

    pub fn of<T: Component>(object_id: ObjectId) -> Self {
        Self::new(object_id, T::TYPE_TAG)
    }
}

impl Wire for ComponentReference {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write(&self.object_id);
        writer.write(&self.component);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            object_id: reader.read()?,
            component: reader.read()?,
        })
    }
}
