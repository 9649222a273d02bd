//! Message codec.
//!
//! [`MessageCodec`] is the seam between in-memory envelopes and wire bytes.
//! [`GraphBinaryCodec`] is the GraphBinary implementation used by the
//! HTTP transport.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

use super::decoder::GraphBinaryDecoder;
use super::encoder::GraphBinaryEncoder;
use super::marker::ENVELOPE_VERSION;
use super::message::{RequestId, RequestMessage, ResponseMessage, ResponseResult, ResponseStatus};
use super::types::GraphValue;
use super::CodecError;

/// MIME type of GraphBinary 4 payloads, used for `content-type` and `accept`.
pub const GRAPHBINARY_MIME_TYPE: &str = "application/vnd.graphbinary-v4.0";

/// Converts envelopes to and from wire bytes.
pub trait MessageCodec: Send + Sync + fmt::Debug {
    /// MIME type naming the serialization format.
    fn mime_type(&self) -> &'static str;

    /// Serialize a request for the wire.
    fn serialize_request(&self, request: &RequestMessage) -> Result<Bytes, CodecError>;

    /// Deserialize a response received from the wire.
    fn deserialize_response(&self, data: &[u8]) -> Result<ResponseMessage, CodecError>;
}

/// GraphBinary envelope codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBinaryCodec;

impl GraphBinaryCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }

    /// Serialize a response (server direction).
    pub fn serialize_response(&self, response: &ResponseMessage) -> Result<Bytes, CodecError> {
        let mut enc = GraphBinaryEncoder::new();
        enc.put_raw_u8(ENVELOPE_VERSION);
        enc.encode_nullable_string(response.request_id.as_ref().map(|id| id.as_str()))?;
        enc.encode(&GraphValue::Int(i32::from(response.status.code)))?;
        enc.encode_nullable_string(response.status.message.as_deref())?;
        enc.encode(&string_map(&response.status.attributes))?;
        enc.encode(&string_map(&response.result.meta))?;
        enc.encode(&response.result.data)?;
        Ok(enc.into_bytes())
    }

    /// Deserialize a request (server direction).
    pub fn deserialize_request(&self, data: &[u8]) -> Result<RequestMessage, CodecError> {
        let mut dec = GraphBinaryDecoder::new(data);
        read_version(&mut dec)?;
        let request_id = dec
            .decode_nullable_string()?
            .ok_or_else(|| CodecError::InvalidEnvelope("Request id must not be null".to_string()))?;
        let op = expect_string(dec.decode()?, "op")?;
        let gremlin = expect_string(dec.decode()?, "gremlin")?;
        let fields = expect_string_map(dec.decode()?)?;
        finish(&dec)?;

        Ok(RequestMessage {
            request_id: RequestId::new(request_id),
            op,
            gremlin,
            fields,
        })
    }
}

impl MessageCodec for GraphBinaryCodec {
    fn mime_type(&self) -> &'static str {
        GRAPHBINARY_MIME_TYPE
    }

    fn serialize_request(&self, request: &RequestMessage) -> Result<Bytes, CodecError> {
        let mut enc = GraphBinaryEncoder::new();
        enc.put_raw_u8(ENVELOPE_VERSION);
        enc.encode(&GraphValue::String(request.request_id.as_str().to_string()))?;
        enc.encode(&GraphValue::String(request.op.clone()))?;
        enc.encode(&GraphValue::String(request.gremlin.clone()))?;
        enc.encode(&string_map(&request.fields))?;
        Ok(enc.into_bytes())
    }

    fn deserialize_response(&self, data: &[u8]) -> Result<ResponseMessage, CodecError> {
        let mut dec = GraphBinaryDecoder::new(data);
        read_version(&mut dec)?;
        let request_id = dec.decode_nullable_string()?.map(RequestId::new);

        let code = match dec.decode()? {
            GraphValue::Int(c) => u16::try_from(c)
                .map_err(|_| CodecError::InvalidEnvelope(format!("Status code out of range: {}", c)))?,
            other => {
                return Err(CodecError::UnexpectedType {
                    expected: "int",
                    found: other.type_name(),
                })
            }
        };
        let message = dec.decode_nullable_string()?;
        let attributes = expect_string_map(dec.decode()?)?;
        let meta = expect_string_map(dec.decode()?)?;
        let data = dec.decode()?;
        finish(&dec)?;

        Ok(ResponseMessage {
            request_id,
            status: ResponseStatus {
                code,
                message,
                attributes,
            },
            result: ResponseResult { data, meta },
        })
    }
}

fn read_version(dec: &mut GraphBinaryDecoder<'_>) -> Result<(), CodecError> {
    let version = dec.read_u8()?;
    if version != ENVELOPE_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(())
}

fn finish(dec: &GraphBinaryDecoder<'_>) -> Result<(), CodecError> {
    if dec.is_empty() {
        Ok(())
    } else {
        Err(CodecError::TrailingBytes(dec.remaining()))
    }
}

/// String-keyed maps go out sorted so the same envelope always yields the same bytes.
fn string_map(map: &HashMap<String, GraphValue>) -> GraphValue {
    let mut entries: Vec<_> = map
        .iter()
        .map(|(k, v)| (GraphValue::String(k.clone()), v.clone()))
        .collect();
    entries.sort_by(|a, b| a.0.as_str().cmp(&b.0.as_str()));
    GraphValue::Map(entries)
}

fn expect_string(value: GraphValue, field: &str) -> Result<String, CodecError> {
    match value {
        GraphValue::String(s) => Ok(s),
        other => Err(CodecError::InvalidEnvelope(format!(
            "Field '{}' must be a string, got {}",
            field,
            other.type_name()
        ))),
    }
}

fn expect_string_map(value: GraphValue) -> Result<HashMap<String, GraphValue>, CodecError> {
    match value {
        GraphValue::Null => Ok(HashMap::new()),
        GraphValue::Map(entries) => entries
            .into_iter()
            .map(|(k, v)| match k {
                GraphValue::String(k) => Ok((k, v)),
                _ => Err(CodecError::InvalidMapKey),
            })
            .collect(),
        other => Err(CodecError::UnexpectedType {
            expected: "map",
            found: other.type_name(),
        }),
    }
}
