//! Transports
//!
//! A [`Transport`] moves framed messages between the engine and a server.
//!
//! ```text
//! ProtocolEngine
//!   ├── write() ──> Transport::write ──> server
//!   └── receive loop <── Transport::read <── hand-off queue
//! ```
//!
//! Two binding styles satisfy the same contract:
//!
//! - **one-shot** ([`HttpTransport`]): `write` performs the whole round trip
//!   and publishes the response body to an internal queue; responses carry
//!   no id, so the engine stamps them with the last request sent.
//! - **persistent**: `write` only sends; responses arrive independently and
//!   carry their own id.

pub mod http;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::auth::CredentialProvider;
use super::config::ConnectionSettings;
use super::error::{DriverError, DriverResult};

pub use http::HttpTransport;

/// How responses are matched to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// The wire carries no id; a response belongs to the last request sent.
    LastSent,
    /// Each response carries the id of its request.
    Embedded,
}

/// Pluggable send/receive channel.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Establish whatever setup the binding needs.
    async fn connect(&self) -> DriverResult<()>;

    /// Send one framed message.
    async fn write(&self, data: Bytes) -> DriverResult<()>;

    /// Wait for the next response buffer.
    ///
    /// Fails with [`DriverError::ConnectionClosed`] once none will ever arrive.
    async fn read(&self) -> DriverResult<Bytes>;

    /// Release resources and unblock `read`. Idempotent.
    async fn close(&self) -> DriverResult<()>;

    /// Whether `close` has run.
    fn is_closed(&self) -> bool;

    /// Configured credential provider, or a no-op provider.
    fn auth_info(&self) -> Arc<dyn CredentialProvider>;

    /// How this binding correlates responses.
    fn correlation(&self) -> Correlation {
        Correlation::LastSent
    }
}

/// Transport bindings that can be built from an endpoint string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// One-shot HTTP request/response
    #[default]
    Http,
}

impl FromStr for TransportKind {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(TransportKind::Http),
            other => Err(DriverError::configuration(format!("Unknown transport '{}'", other))),
        }
    }
}

/// Build a transport of the given kind. The transport is not yet connected.
pub fn create(
    kind: TransportKind,
    endpoint: &str,
    settings: &ConnectionSettings,
) -> DriverResult<Arc<dyn Transport>> {
    settings.validate()?;
    match kind {
        TransportKind::Http => Ok(Arc::new(HttpTransport::new(endpoint, settings)?)),
    }
}
