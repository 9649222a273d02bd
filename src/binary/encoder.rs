//! GraphBinary encoder.

use bytes::{BufMut, Bytes, BytesMut};

use super::marker::*;
use super::types::GraphValue;
use super::CodecError;

/// GraphBinary encoder that writes fully qualified values to a byte buffer.
pub struct GraphBinaryEncoder {
    buffer: BytesMut,
}

impl GraphBinaryEncoder {
    /// Create a new encoder with default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new encoder with specified buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the encoder and return the bytes.
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }

    /// Write a raw byte, used for envelope headers.
    pub fn put_raw_u8(&mut self, byte: u8) {
        self.buffer.put_u8(byte);
    }

    /// Encode a value with its type code and value flag.
    pub fn encode(&mut self, value: &GraphValue) -> Result<(), CodecError> {
        match value {
            GraphValue::Null => {
                self.encode_null();
                Ok(())
            }
            GraphValue::Boolean(b) => {
                self.header(BOOLEAN);
                self.buffer.put_u8(u8::from(*b));
                Ok(())
            }
            GraphValue::Int(i) => {
                self.header(INT);
                self.buffer.put_i32(*i);
                Ok(())
            }
            GraphValue::Long(l) => {
                self.header(LONG);
                self.buffer.put_i64(*l);
                Ok(())
            }
            GraphValue::Double(d) => {
                self.header(DOUBLE);
                self.buffer.put_f64(*d);
                Ok(())
            }
            GraphValue::String(s) => {
                self.header(STRING);
                self.put_string_body(s)
            }
            GraphValue::Uuid(u) => {
                self.header(UUID);
                self.buffer.put_slice(u.as_bytes());
                Ok(())
            }
            GraphValue::DateTime(dt) => {
                self.header(DATETIME);
                self.buffer.put_i64(dt.timestamp());
                self.buffer.put_u32(dt.timestamp_subsec_nanos());
                Ok(())
            }
            GraphValue::Binary(b) => {
                self.header(BINARY);
                self.put_length("binary", b.len())?;
                self.buffer.put_slice(b);
                Ok(())
            }
            GraphValue::List(items) => {
                self.header(LIST);
                self.put_items("list", items)
            }
            GraphValue::Set(items) => {
                self.header(SET);
                self.put_items("set", items)
            }
            GraphValue::Map(entries) => {
                self.header(MAP);
                self.put_length("map", entries.len())?;
                for (k, v) in entries {
                    self.encode(k)?;
                    self.encode(v)?;
                }
                Ok(())
            }
        }
    }

    /// Encode an untyped null.
    pub fn encode_null(&mut self) {
        self.buffer.put_u8(UNSPECIFIED_NULL);
        self.buffer.put_u8(VALUE_NULL);
    }

    /// Encode an optional string as a typed, possibly null, string.
    pub fn encode_nullable_string(&mut self, value: Option<&str>) -> Result<(), CodecError> {
        match value {
            Some(s) => {
                self.header(STRING);
                self.put_string_body(s)
            }
            None => {
                self.buffer.put_u8(STRING);
                self.buffer.put_u8(VALUE_NULL);
                Ok(())
            }
        }
    }

    fn header(&mut self, code: u8) {
        self.buffer.put_u8(code);
        self.buffer.put_u8(VALUE_PRESENT);
    }

    fn put_length(&mut self, what: &'static str, len: usize) -> Result<(), CodecError> {
        let len = i32::try_from(len).map_err(|_| CodecError::ValueTooLarge(what, len))?;
        self.buffer.put_i32(len);
        Ok(())
    }

    fn put_string_body(&mut self, value: &str) -> Result<(), CodecError> {
        self.put_length("string", value.len())?;
        self.buffer.put_slice(value.as_bytes());
        Ok(())
    }

    fn put_items(&mut self, what: &'static str, items: &[GraphValue]) -> Result<(), CodecError> {
        self.put_length(what, items.len())?;
        for item in items {
            self.encode(item)?;
        }
        Ok(())
    }
}

impl Default for GraphBinaryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode a single value.
pub fn encode(value: &GraphValue) -> Result<Bytes, CodecError> {
    let mut encoder = GraphBinaryEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}
