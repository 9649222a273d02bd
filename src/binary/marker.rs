//! GraphBinary type codes.
//!
//! Every fully qualified value starts with a type code byte followed by a
//! value flag byte. The flag tells whether a payload follows.

/// Int (32-bit signed)
pub const INT: u8 = 0x01;
/// Long (64-bit signed)
pub const LONG: u8 = 0x02;
/// UTF-8 string, `i32` length prefix
pub const STRING: u8 = 0x03;
/// UTC date-time: `i64` epoch seconds + `u32` nanoseconds
pub const DATETIME: u8 = 0x04;
/// Double (64-bit IEEE 754)
pub const DOUBLE: u8 = 0x07;
/// List, `i32` length prefix
pub const LIST: u8 = 0x09;
/// Map, `i32` entry count prefix
pub const MAP: u8 = 0x0A;
/// Set, `i32` length prefix
pub const SET: u8 = 0x0B;
/// UUID, 16 bytes
pub const UUID: u8 = 0x0C;
/// Binary blob, `i32` length prefix
pub const BINARY: u8 = 0x25;
/// Boolean, one byte
pub const BOOLEAN: u8 = 0x27;
/// Null whose type is not known
pub const UNSPECIFIED_NULL: u8 = 0xFE;

/// Value flag: payload follows
pub const VALUE_PRESENT: u8 = 0x00;
/// Value flag: value is null, no payload
pub const VALUE_NULL: u8 = 0x01;

/// Envelope version byte (GraphBinary 4, high bit set)
pub const ENVELOPE_VERSION: u8 = 0x81;

/// Human-readable name of a type code, used in error messages.
pub fn type_name(code: u8) -> &'static str {
    match code {
        INT => "int",
        LONG => "long",
        STRING => "string",
        DATETIME => "datetime",
        DOUBLE => "double",
        LIST => "list",
        MAP => "map",
        SET => "set",
        UUID => "uuid",
        BINARY => "binary",
        BOOLEAN => "boolean",
        UNSPECIFIED_NULL => "null",
        _ => "unknown",
    }
}

/// Check whether a byte is a type code this codec understands.
pub fn is_known_type(code: u8) -> bool {
    type_name(code) != "unknown"
}
