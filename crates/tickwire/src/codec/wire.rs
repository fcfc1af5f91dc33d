use glam::{Quat, Vec3};

use super::reader::{ByteReader, DecodeError};
use super::writer::ByteWriter;

/// A value with a binary wire representation.
///
/// `decode(encode(v)) == v` must hold for every value.
pub trait Wire: Sized {
    fn encode(&self, writer: &mut ByteWriter);

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.encode(&mut writer);
        writer.into_bytes()
    }

    /// Decodes a complete buffer; leftover bytes are an error.
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

macro_rules! impl_wire_primitive {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl Wire for $ty {
                #[inline]
                fn encode(&self, writer: &mut ByteWriter) {
                    writer.$write(*self);
                }

                #[inline]
                fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
                    reader.$read()
                }
            }
        )*
    };
}

impl_wire_primitive! {
    u8 => write_u8, read_u8;
    bool => write_bool, read_bool;
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
    i32 => write_i32, read_i32;
    i64 => write_i64, read_i64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

impl Wire for String {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_str(self);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_string()
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_var_u32(self.len() as u32);
        for item in self {
            item.encode(writer);
        }
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_var_u32()? as usize;
        // Every element takes at least one byte, so the remaining length caps the allocation.
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl<T: Wire> Wire for Option<T> {
    fn encode(&self, writer: &mut ByteWriter) {
        match self {
            Some(value) => {
                writer.write_bool(true);
                value.encode(writer);
            }
            None => writer.write_bool(false),
        }
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        if reader.read_bool()? {
            T::decode(reader).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl Wire for Vec3 {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        writer.write_f32(self.z);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Vec3::new(
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        ))
    }
}

impl Wire for Quat {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        writer.write_f32(self.z);
        writer.write_f32(self.w);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Quat::from_xyzw(
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        ))
    }
}
