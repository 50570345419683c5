//! Protobuf wire-format reading helpers
//!
//! Generic utilities for decoding protobuf messages without code
//! generation: varints, zigzag integers, fixed64 doubles, and
//! length-delimited sub-slices, bounds-checked everywhere. Offsets in
//! errors are relative to the message being decoded.

use crate::error::ParseError;
use crate::Result;

/// Protobuf wire types. Group wire types (3, 4) are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireType {
    Varint,
    Fixed64,
    Len,
    Fixed32,
}

impl WireType {
    fn from_u8(value: u8, offset: usize) -> Result<Self> {
        match value {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::Len),
            5 => Ok(Self::Fixed32),
            other => Err(ParseError::syntax(
                offset,
                format!("unsupported wire type {other}"),
            )),
        }
    }
}

/// Cursor over one protobuf message
#[derive(Debug, Clone, Copy)]
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Read a base-128 varint (at most 10 bytes)
    pub fn read_varint(&mut self) -> Result<u64> {
        let start = self.pos;
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(ParseError::invalid_varint(start))?;
            self.pos += 1;
            if shift == 63 && byte > 1 {
                return Err(ParseError::invalid_varint(start));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(ParseError::invalid_varint(start));
            }
        }
    }

    /// Read the next field tag, or None at end of message
    pub fn read_tag(&mut self) -> Result<Option<(u32, WireType)>> {
        if self.is_at_end() {
            return Ok(None);
        }
        let offset = self.pos;
        let key = self.read_varint()?;
        let field = (key >> 3) as u32;
        if field == 0 {
            return Err(ParseError::syntax(offset, "field number zero"));
        }
        let wire_type = WireType::from_u8((key & 0x7) as u8, offset)?;
        Ok(Some((field, wire_type)))
    }

    /// Read a length-delimited payload as a sub-slice of the buffer
    pub fn read_len_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| ParseError::truncated(usize::MAX, self.buf.len()))?;
        if end > self.buf.len() {
            return Err(ParseError::truncated(end, self.buf.len()));
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Read a length-delimited UTF-8 string
    pub fn read_string(&mut self) -> Result<&'a str> {
        let offset = self.pos;
        let bytes = self.read_len_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8 { offset })
    }

    /// Read a little-endian fixed64 as f64
    pub fn read_double(&mut self) -> Result<f64> {
        let end = self.pos + 8;
        if end > self.buf.len() {
            return Err(ParseError::truncated(end, self.buf.len()));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(f64::from_le_bytes(raw))
    }

    /// Skip a field of the given wire type
    pub fn skip(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                let end = self.pos + 8;
                if end > self.buf.len() {
                    return Err(ParseError::truncated(end, self.buf.len()));
                }
                self.pos = end;
            }
            WireType::Len => {
                self.read_len_bytes()?;
            }
            WireType::Fixed32 => {
                let end = self.pos + 4;
                if end > self.buf.len() {
                    return Err(ParseError::truncated(end, self.buf.len()));
                }
                self.pos = end;
            }
        }
        Ok(())
    }
}

/// Zigzag-decode a varint into a signed 64-bit integer
#[inline]
pub(crate) fn zigzag64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Zigzag-decode a varint into a signed 32-bit integer
#[inline]
pub(crate) fn zigzag32(value: u64) -> i32 {
    zigzag64(value) as i32
}

/// Read the uvarint message-length delimiter at `pos` in the outer buffer.
/// Returns the length and the number of delimiter bytes.
pub(crate) fn read_delimiter(buf: &[u8], pos: usize) -> Result<(usize, usize)> {
    let mut reader = WireReader::new(&buf[pos..]);
    let len = reader.read_varint().map_err(|_| ParseError::invalid_varint(pos))?;
    Ok((len as usize, reader.pos))
}
