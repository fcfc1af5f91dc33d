use super::wire::Wire;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("variable-length integer overflows 32 bits")]
    InvalidVarint,
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid {what} discriminant {value}")]
    InvalidDiscriminant { what: &'static str, value: u8 },
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Sequential cursor over a borrowed buffer. Every read is bounds-checked.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(DecodeError::UnexpectedEof { needed, remaining });
        }
        let bytes = &self.buffer[self.position..self.position + needed];
        self.position += needed;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::InvalidDiscriminant {
                what: "bool",
                value,
            }),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.take_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.take_array().map(u64::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.take_array().map(i32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.take_array().map(i64::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        self.take_array().map(f32::from_le_bytes)
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        self.take_array().map(f64::from_le_bytes)
    }

    pub fn read_var_u32(&mut self) -> Result<u32, DecodeError> {
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            // The fifth byte only has room for the top four bits.
            if shift == 28 && byte > 0x0F {
                return Err(DecodeError::InvalidVarint);
            }
            value |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::InvalidVarint)
    }

    /// Reads a length-prefixed byte slice without copying.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_var_u32()? as usize;
        self.take(len)
    }

    pub fn read_str(&mut self) -> Result<&'a str, DecodeError> {
        std::str::from_utf8(self.read_bytes()?).map_err(|_| DecodeError::InvalidUtf8)
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        self.read_str().map(str::to_owned)
    }

    /// Reads `len` bytes verbatim, without a length prefix.
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }

    /// Consumes everything left in the buffer.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buffer[self.position..];
        self.position = self.buffer.len();
        rest
    }

    pub fn read<T: Wire>(&mut self) -> Result<T, DecodeError> {
        T::decode(self)
    }

    /// Fails if any bytes were left unread.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            trailing => Err(DecodeError::TrailingBytes(trailing)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_past_end_fails() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        assert_eq!(
            reader.read_u32(),
            Err(DecodeError::UnexpectedEof {
                needed: 4,
                remaining: 3
            })
        );
        // A failed read does not advance the cursor.
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_u16(), Ok(0x0201));
    }

    #[test]
    fn var_u32_rejects_overflow() {
        let mut reader = ByteReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert_eq!(reader.read_var_u32(), Err(DecodeError::InvalidVarint));

        let mut reader = ByteReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(reader.read_var_u32(), Ok(u32::MAX));
    }

    #[test]
    fn length_prefix_larger_than_buffer() {
        let mut reader = ByteReader::new(&[10, b'a']);
        assert!(matches!(
            reader.read_bytes(),
            Err(DecodeError::UnexpectedEof { needed: 10, .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut reader = ByteReader::new(&[2, 0xC3, 0x28]);
        assert_eq!(reader.read_str(), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn finish_reports_trailing_bytes() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        reader.read_u8().unwrap();
        assert_eq!(reader.finish(), Err(DecodeError::TrailingBytes(2)));
    }
}
