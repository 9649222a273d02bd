//! Request and response envelopes.
//!
//! Requests flow from the client to the server; responses flow back and are
//! matched to the request that caused them through a [`RequestId`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::GraphValue;

/// Status codes the protocol engine reacts to.
pub mod status {
    /// Request processed, full result attached
    pub const SUCCESS: u16 = 200;
    /// Request processed, nothing to return
    pub const NO_CONTENT: u16 = 204;
    /// Part of a streamed result; more responses follow
    pub const PARTIAL_CONTENT: u16 = 206;
    /// Server requires credentials
    pub const PROXY_AUTHENTICATION_REQUIRED: u16 = 407;
    /// Server-specific authentication challenge, treated like 407
    pub const AUTHENTICATE: u16 = 151;

    /// Check whether a code is an authentication challenge.
    pub fn is_auth_challenge(code: u16) -> bool {
        code == PROXY_AUTHENTICATION_REQUIRED || code == AUTHENTICATE
    }
}

/// Request operations.
pub mod op {
    /// Evaluate a script or serialized traversal
    pub const EVAL: &str = "eval";
    /// Answer an authentication challenge
    pub const AUTHENTICATION: &str = "authentication";
}

/// Metadata key carrying the aggregation hint.
pub const AGGREGATE_TO_KEY: &str = "aggregateTo";

/// Field key carrying the SASL payload of an authentication request.
pub const SASL_KEY: &str = "sasl";

// ============================================================================
// RequestId - correlation id
// ============================================================================

/// Opaque token linking a request to its response(s).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an existing token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// RequestMessage
// ============================================================================

/// A request envelope. Immutable once handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMessage {
    /// Correlation id
    pub request_id: RequestId,
    /// Operation name (see [`op`])
    pub op: String,
    /// Query text or serialized traversal
    pub gremlin: String,
    /// Additional request fields (bindings, aliases, timeouts, ...)
    pub fields: HashMap<String, GraphValue>,
}

impl RequestMessage {
    /// Create an `eval` request with a fresh id.
    pub fn eval(gremlin: impl Into<String>) -> Self {
        Self::eval_with_id(RequestId::generate(), gremlin)
    }

    /// Create an `eval` request with a caller-chosen id.
    pub fn eval_with_id(request_id: RequestId, gremlin: impl Into<String>) -> Self {
        Self {
            request_id,
            op: op::EVAL.to_string(),
            gremlin: gremlin.into(),
            fields: HashMap::new(),
        }
    }

    /// Create the authentication retry for an exchange.
    ///
    /// The retry keeps the challenged exchange's id so the answer lands in
    /// the same result set.
    pub fn authentication(request_id: RequestId, sasl: impl Into<String>) -> Self {
        let mut fields = HashMap::new();
        fields.insert(SASL_KEY.to_string(), GraphValue::String(sasl.into()));
        Self {
            request_id,
            op: op::AUTHENTICATION.to_string(),
            gremlin: String::new(),
            fields,
        }
    }

    /// Add a field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<GraphValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add a parameter binding.
    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<GraphValue>) -> Self {
        let name = name.into();
        let mut bindings = match self.fields.remove("bindings") {
            Some(GraphValue::Map(entries)) => entries,
            _ => Vec::new(),
        };
        bindings.retain(|(k, _)| k.as_str() != Some(name.as_str()));
        bindings.push((GraphValue::String(name), value.into()));
        self.fields.insert("bindings".to_string(), GraphValue::Map(bindings));
        self
    }

    /// Check whether this is an authentication retry.
    pub fn is_authentication(&self) -> bool {
        self.op == op::AUTHENTICATION
    }
}

// ============================================================================
// ResponseMessage
// ============================================================================

/// Status part of a response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseStatus {
    /// Status code (see [`status`])
    pub code: u16,
    /// Optional human-readable message
    pub message: Option<String>,
    /// Status attributes (exception details, warnings, ...)
    pub attributes: HashMap<String, GraphValue>,
}

/// Result part of a response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseResult {
    /// Result payload
    pub data: GraphValue,
    /// Result metadata, may carry [`AGGREGATE_TO_KEY`]
    pub meta: HashMap<String, GraphValue>,
}

/// A response envelope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseMessage {
    /// Correlation id, `None` when the wire carries no identifier
    pub request_id: Option<RequestId>,
    /// Status
    pub status: ResponseStatus,
    /// Result
    pub result: ResponseResult,
}

impl ResponseMessage {
    /// Create a response with the given status code and payload.
    pub fn new(code: u16, data: GraphValue) -> Self {
        Self {
            request_id: None,
            status: ResponseStatus {
                code,
                ..Default::default()
            },
            result: ResponseResult {
                data,
                meta: HashMap::new(),
            },
        }
    }

    /// Set the correlation id.
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Set the status message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status.message = Some(message.into());
        self
    }

    /// Add a status attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<GraphValue>) -> Self {
        self.status.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<GraphValue>) -> Self {
        self.result.meta.insert(key.into(), value.into());
        self
    }

    /// Status code shortcut.
    pub fn code(&self) -> u16 {
        self.status.code
    }

    /// Aggregation hint, if the server sent one.
    pub fn aggregate_to(&self) -> Option<&str> {
        self.result.meta.get(AGGREGATE_TO_KEY).and_then(|v| v.as_str())
    }
}
