use std::fmt;

use super::reader::{ByteReader, DecodeError};
use super::wire::Wire;
use super::writer::ByteWriter;

pub const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
pub const FNV_PRIME: u64 = 1099511628211;

#[inline]
const fn fold(hash: u64, unit: u32) -> u64 {
    // XOR first, then multiply. Peers compute tags the same way, so the order is part of the wire format.
    (hash ^ unit as u64).wrapping_mul(FNV_PRIME)
}

/// Hashes a type name over its UTF-16 code units.
///
/// ASCII names hash byte for byte; anything else is folded as the UTF-16
/// units a peer holding the same name as a UTF-16 string would see.
pub const fn type_hash(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;

    while i < bytes.len() {
        let lead = bytes[i] as u32;
        let (scalar, width) = if lead < 0x80 {
            (lead, 1)
        } else if lead < 0xE0 {
            (((lead & 0x1F) << 6) | (bytes[i + 1] as u32 & 0x3F), 2)
        } else if lead < 0xF0 {
            (
                ((lead & 0x0F) << 12)
                    | ((bytes[i + 1] as u32 & 0x3F) << 6)
                    | (bytes[i + 2] as u32 & 0x3F),
                3,
            )
        } else {
            (
                ((lead & 0x07) << 18)
                    | ((bytes[i + 1] as u32 & 0x3F) << 12)
                    | ((bytes[i + 2] as u32 & 0x3F) << 6)
                    | (bytes[i + 3] as u32 & 0x3F),
                4,
            )
        };
        i += width;

        if scalar >= 0x10000 {
            let offset = scalar - 0x10000;
            hash = fold(hash, 0xD800 | (offset >> 10));
            hash = fold(hash, 0xDC00 | (offset & 0x3FF));
        } else {
            hash = fold(hash, scalar);
        }
    }

    hash
}

/// Deterministic identifier of a wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(pub u64);

impl TypeTag {
    pub const fn of(name: &str) -> Self {
        Self(type_hash(name))
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl Wire for TypeTag {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.0);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_u64().map(Self)
    }
}

/// A type that is identified on the wire by the hash of its canonical name.
///
/// The tag is a constant, so it is computed once at compile time.
pub trait WireType {
    const TYPE_NAME: &'static str;
    const TYPE_TAG: TypeTag = TypeTag::of(Self::TYPE_NAME);
}
