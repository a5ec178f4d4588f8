// Canonical field-numbered binary encoding.
//
// Layout follows protobuf wire rules with stricter canonical constraints:
// every scalar field is always written, fields appear in ascending order,
// varints are minimal and arrays are repeated fields (an empty array writes
// nothing). Signatures and ids are computed over this encoding, so the
// `Reader` rejects anything a `Writer` would not have produced.

use thiserror::Error;

const WIRE_VARINT: u8 = 0;
const WIRE_BYTES: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("varint is malformed or not minimally encoded")]
    InvalidVarint,
    #[error("expected field {expected}, found key {found:#x}")]
    UnexpectedField { expected: u32, found: u64 },
    #[error("field {field} is missing")]
    MissingField { field: u32 },
    #[error("field {field} has length {actual}, expected {expected}")]
    InvalidLength {
        field: u32,
        expected: usize,
        actual: usize,
    },
    #[error("field {field} value {value} is out of range")]
    OutOfRange { field: u32, value: u64 },
    #[error("field {0} is not valid utf-8")]
    InvalidUtf8(u32),
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
    #[error("unknown transaction type {0}")]
    UnknownTransactionType(u32),
}

fn key(field: u32, wire: u8) -> u64 {
    (u64::from(field) << 3) | u64::from(wire)
}

fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write_u32(&mut self, field: u32, v: u32) -> &mut Self {
        self.write_u64(field, u64::from(v))
    }

    pub fn write_u64(&mut self, field: u32, v: u64) -> &mut Self {
        put_varint(&mut self.buf, key(field, WIRE_VARINT));
        put_varint(&mut self.buf, v);
        self
    }

    /// Zig-zag signed integer.
    pub fn write_i64(&mut self, field: u32, v: i64) -> &mut Self {
        let zz = ((v << 1) ^ (v >> 63)) as u64;
        self.write_u64(field, zz)
    }

    pub fn write_bytes(&mut self, field: u32, v: &[u8]) -> &mut Self {
        put_varint(&mut self.buf, key(field, WIRE_BYTES));
        put_varint(&mut self.buf, v.len() as u64);
        self.buf.extend_from_slice(v);
        self
    }

    pub fn write_str(&mut self, field: u32, v: &str) -> &mut Self {
        self.write_bytes(field, v.as_bytes())
    }

    /// Nested object, already encoded.
    pub fn write_object(&mut self, field: u32, encoded: &[u8]) -> &mut Self {
        self.write_bytes(field, encoded)
    }

    pub fn write_repeated_bytes<T: AsRef<[u8]>>(&mut self, field: u32, items: &[T]) -> &mut Self {
        for item in items {
            self.write_bytes(field, item.as_ref());
        }
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_varint(&mut self) -> Result<u64, CodecError> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self.buf.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
            self.pos += 1;
            if shift == 63 && byte > 1 {
                return Err(CodecError::InvalidVarint);
            }
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                // A trailing zero group means a longer-than-minimal encoding.
                if byte == 0 && shift > 0 {
                    return Err(CodecError::InvalidVarint);
                }
                return Ok(result);
            }
            shift += 7;
            if shift > 63 {
                return Err(CodecError::InvalidVarint);
            }
        }
    }

    fn peek_key(&self) -> Result<Option<u64>, CodecError> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let mut ahead = self.clone();
        ahead.read_varint().map(Some)
    }

    fn expect_key(&mut self, field: u32, wire: u8) -> Result<(), CodecError> {
        match self.peek_key()? {
            None => Err(CodecError::MissingField { field }),
            Some(k) if k == key(field, wire) => {
                self.read_varint()?;
                Ok(())
            }
            Some(found) => Err(CodecError::UnexpectedField {
                expected: field,
                found,
            }),
        }
    }

    pub fn read_u64(&mut self, field: u32) -> Result<u64, CodecError> {
        self.expect_key(field, WIRE_VARINT)?;
        self.read_varint()
    }

    pub fn read_u32(&mut self, field: u32) -> Result<u32, CodecError> {
        let v = self.read_u64(field)?;
        u32::try_from(v).map_err(|_| CodecError::OutOfRange { field, value: v })
    }

    pub fn read_i64(&mut self, field: u32) -> Result<i64, CodecError> {
        let zz = self.read_u64(field)?;
        Ok(((zz >> 1) as i64) ^ -((zz & 1) as i64))
    }

    pub fn read_bytes(&mut self, field: u32) -> Result<&'a [u8], CodecError> {
        self.expect_key(field, WIRE_BYTES)?;
        let len = self.read_varint()? as usize;
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let out = self.buf.get(self.pos..end).ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(out)
    }

    pub fn read_fixed<const N: usize>(&mut self, field: u32) -> Result<[u8; N], CodecError> {
        let bytes = self.read_bytes(field)?;
        <[u8; N]>::try_from(bytes).map_err(|_| CodecError::InvalidLength {
            field,
            expected: N,
            actual: bytes.len(),
        })
    }

    pub fn read_str(&mut self, field: u32) -> Result<String, CodecError> {
        let bytes = self.read_bytes(field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8(field))
    }

    /// Zero or more consecutive occurrences of a length-delimited field.
    pub fn read_repeated_bytes(&mut self, field: u32) -> Result<Vec<&'a [u8]>, CodecError> {
        let mut out = Vec::new();
        while self.peek_key()? == Some(key(field, WIRE_BYTES)) {
            out.push(self.read_bytes(field)?);
        }
        Ok(out)
    }

    pub fn read_repeated_fixed<const N: usize>(
        &mut self,
        field: u32,
    ) -> Result<Vec<[u8; N]>, CodecError> {
        self.read_repeated_bytes(field)?
            .into_iter()
            .map(|b| {
                <[u8; N]>::try_from(b).map_err(|_| CodecError::InvalidLength {
                    field,
                    expected: N,
                    actual: b.len(),
                })
            })
            .collect()
    }

    pub fn finish(self) -> Result<(), CodecError> {
        let rest = self.buf.len() - self.pos;
        if rest != 0 {
            return Err(CodecError::TrailingBytes(rest));
        }
        Ok(())
    }
}
