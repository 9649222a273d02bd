//! GraphBinary decoder.

use bytes::Buf;
use chrono::DateTime;
use uuid::Uuid;

use super::marker::*;
use super::types::GraphValue;
use super::CodecError;

/// Upper bound on pre-allocated collection capacity, so a hostile length
/// prefix cannot force a huge allocation before any element is read.
const MAX_PREALLOC: usize = 1024;

/// Deepest collection nesting accepted. Decoding recurses once per level.
pub const MAX_DEPTH: usize = 128;

/// GraphBinary decoder that reads fully qualified values from a byte slice.
pub struct GraphBinaryDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> GraphBinaryDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Get the current position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get remaining bytes count.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<GraphValue, CodecError> {
        let code = self.read_u8()?;
        if !is_known_type(code) {
            return Err(CodecError::UnknownType(code));
        }

        let flag = self.read_u8()?;
        match flag {
            VALUE_NULL => return Ok(GraphValue::Null),
            VALUE_PRESENT => {}
            other => return Err(CodecError::InvalidValueFlag(other)),
        }

        match code {
            UNSPECIFIED_NULL => Err(CodecError::InvalidValueFlag(flag)),
            BOOLEAN => match self.read_u8()? {
                0 => Ok(GraphValue::Boolean(false)),
                1 => Ok(GraphValue::Boolean(true)),
                b => Err(CodecError::InvalidEnvelope(format!("Invalid boolean byte 0x{:02X}", b))),
            },
            INT => Ok(GraphValue::Int(self.read_i32()?)),
            LONG => Ok(GraphValue::Long(self.read_i64()?)),
            DOUBLE => Ok(GraphValue::Double(self.read_f64()?)),
            STRING => Ok(GraphValue::String(self.read_string_body()?)),
            UUID => {
                let bytes = self.read_slice(16)?;
                let uuid = Uuid::from_slice(bytes)
                    .map_err(|e| CodecError::InvalidEnvelope(format!("Invalid uuid: {}", e)))?;
                Ok(GraphValue::Uuid(uuid))
            }
            DATETIME => {
                let secs = self.read_i64()?;
                let nanos = self.read_u32()?;
                let dt = DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
                    CodecError::InvalidEnvelope(format!("Datetime out of range: {}s", secs))
                })?;
                Ok(GraphValue::DateTime(dt))
            }
            BINARY => {
                let len = self.read_length()?;
                Ok(GraphValue::Binary(self.read_slice(len)?.to_vec()))
            }
            LIST | SET | MAP => {
                if self.depth >= MAX_DEPTH {
                    return Err(CodecError::NestingTooDeep(MAX_DEPTH));
                }
                self.depth += 1;
                let value = self.read_collection(code);
                self.depth -= 1;
                value
            }
            _ => Err(CodecError::UnknownType(code)),
        }
    }

    /// Decode a typed, possibly null, string.
    pub fn decode_nullable_string(&mut self) -> Result<Option<String>, CodecError> {
        match self.decode()? {
            GraphValue::Null => Ok(None),
            GraphValue::String(s) => Ok(Some(s)),
            other => Err(CodecError::UnexpectedType {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    /// Read a raw byte, used for envelope headers.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.ensure(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn ensure(&self, n: usize) -> Result<(), CodecError> {
        if self.remaining() < n {
            Err(CodecError::UnexpectedEof)
        } else {
            Ok(())
        }
    }

    fn read_slice(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        let mut slice = self.read_slice(4)?;
        Ok(slice.get_i32())
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let mut slice = self.read_slice(4)?;
        Ok(slice.get_u32())
    }

    fn read_i64(&mut self) -> Result<i64, CodecError> {
        let mut slice = self.read_slice(8)?;
        Ok(slice.get_i64())
    }

    fn read_f64(&mut self) -> Result<f64, CodecError> {
        let mut slice = self.read_slice(8)?;
        Ok(slice.get_f64())
    }

    fn read_length(&mut self) -> Result<usize, CodecError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| CodecError::NegativeLength(len))
    }

    fn read_string_body(&mut self) -> Result<String, CodecError> {
        let len = self.read_length()?;
        let bytes = self.read_slice(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::InvalidUtf8(e.to_string()))
    }

    fn read_collection(&mut self, code: u8) -> Result<GraphValue, CodecError> {
        match code {
            LIST => Ok(GraphValue::List(self.read_items()?)),
            SET => Ok(GraphValue::Set(self.read_items()?)),
            _ => {
                let len = self.read_length()?;
                let mut entries = Vec::with_capacity(len.min(MAX_PREALLOC));
                for _ in 0..len {
                    let key = self.decode()?;
                    let value = self.decode()?;
                    entries.push((key, value));
                }
                Ok(GraphValue::Map(entries))
            }
        }
    }

    fn read_items(&mut self) -> Result<Vec<GraphValue>, CodecError> {
        let len = self.read_length()?;
        let mut items = Vec::with_capacity(len.min(MAX_PREALLOC));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(items)
    }
}

/// Convenience function to decode a single value. Trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<GraphValue, CodecError> {
    let mut decoder = GraphBinaryDecoder::new(data);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes(decoder.remaining()));
    }
    Ok(value)
}
