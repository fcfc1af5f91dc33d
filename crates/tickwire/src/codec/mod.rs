//! Binary codec shared by every wire-visible type.
//!
//! Fixed-width integers are little-endian. Strings, byte slices and
//! collection counts carry a 7-bit variable-length prefix.

mod reader;
mod type_tag;
mod wire;
mod writer;

pub use reader::{ByteReader, DecodeError};
pub use type_tag::{FNV_OFFSET_BASIS, FNV_PRIME, TypeTag, WireType, type_hash};
pub use wire::Wire;
pub use writer::ByteWriter;
