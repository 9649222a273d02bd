//! # GraphBinary wire layer
//!
//! Serialization of values and of the request/response envelopes exchanged
//! with a Gremlin-compatible server.
//!
//! ## Value format
//!
//! Every value is written fully qualified:
//!
//! ```text
//! +-----------+------------+-------------------+
//! | type code | value flag | payload (if 0x00) |
//! +-----------+------------+-------------------+
//! ```
//!
//! Lengths and numbers are big-endian. Collections carry an `i32` element
//! count followed by fully qualified elements.
//!
//! ## Submodules
//!
//! - [`types`] - the [`GraphValue`] enum
//! - [`marker`] - type codes and flags
//! - [`encoder`] / [`decoder`] - value serialization
//! - [`message`] - request/response envelopes and status codes
//! - [`codec`] - the [`MessageCodec`] seam and [`GraphBinaryCodec`]
//!
//! ## Note
//!
//! Most users only touch this module for [`GraphValue`] and
//! [`RequestMessage`]; the protocol engine in [`crate::driver`] drives the
//! codec.

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod message;
pub mod types;

pub use codec::{GraphBinaryCodec, MessageCodec, GRAPHBINARY_MIME_TYPE};
pub use decoder::{decode, GraphBinaryDecoder};
pub use encoder::{encode, GraphBinaryEncoder};
pub use message::{
    status, RequestId, RequestMessage, ResponseMessage, ResponseResult, ResponseStatus,
    AGGREGATE_TO_KEY,
};
pub use types::GraphValue;

use std::fmt;

/// Codec errors.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Unexpected end of input
    UnexpectedEof,
    /// Unknown type code
    UnknownType(u8),
    /// Value flag other than present/null
    InvalidValueFlag(u8),
    /// Envelope version not supported
    UnsupportedVersion(u8),
    /// Negative length prefix
    NegativeLength(i32),
    /// Invalid UTF-8 in string
    InvalidUtf8(String),
    /// Envelope map keys must be strings
    InvalidMapKey,
    /// A value of another type was expected
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },
    /// Value too large to encode
    ValueTooLarge(&'static str, usize),
    /// Bytes left over after a complete envelope
    TrailingBytes(usize),
    /// Structurally invalid envelope
    InvalidEnvelope(String),
    /// Collections nested deeper than the decoder accepts
    NestingTooDeep(usize),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::UnexpectedEof => write!(f, "Unexpected end of GraphBinary data"),
            CodecError::UnknownType(code) => write!(f, "Unknown GraphBinary type code: 0x{:02X}", code),
            CodecError::InvalidValueFlag(flag) => write!(f, "Invalid value flag: 0x{:02X}", flag),
            CodecError::UnsupportedVersion(v) => write!(f, "Unsupported envelope version: 0x{:02X}", v),
            CodecError::NegativeLength(len) => write!(f, "Negative length prefix: {}", len),
            CodecError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            CodecError::InvalidMapKey => write!(f, "Envelope map keys must be strings"),
            CodecError::UnexpectedType { expected, found } => {
                write!(f, "Expected {}, found {}", expected, found)
            }
            CodecError::ValueTooLarge(what, size) => write!(f, "{} too large: {} elements", what, size),
            CodecError::TrailingBytes(n) => write!(f, "{} trailing bytes after envelope", n),
            CodecError::InvalidEnvelope(msg) => write!(f, "Invalid envelope: {}", msg),
            CodecError::NestingTooDeep(max) => write!(f, "Collections nested deeper than {} levels", max),
        }
    }
}

impl std::error::Error for CodecError {}
