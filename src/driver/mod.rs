//! Driver Module
//!
//! Connection-level machinery on top of the [`crate::binary`] wire layer.
//!
//! # Components
//!
//! - [`ProtocolEngine`]: request writer, background receive loop, response handler
//! - [`ResultSet`] / [`ResultSetRegistry`]: per-exchange result buffers keyed by correlation id
//! - [`Transport`]: pluggable send/receive channel, with [`HttpTransport`] as the one-shot binding
//! - [`ConnectionSettings`] / [`AuthToken`]: configuration and credentials
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gremlin_driver::driver::{
//!     AuthToken, ConnectionSettings, DriverError, ErrorCallback, ProtocolEngine, ResultSetRegistry,
//!     TransportKind,
//! };
//! use gremlin_driver::binary::RequestMessage;
//!
//! let settings = ConnectionSettings::builder()
//!     .with_auth(AuthToken::basic("stephen", "password"))
//!     .build();
//! let registry = Arc::new(ResultSetRegistry::new());
//! let on_error: ErrorCallback = Arc::new(|err: &DriverError| eprintln!("connection failed: {}", err));
//!
//! let engine = ProtocolEngine::new(
//!     TransportKind::Http,
//!     "http://localhost:8182/gremlin",
//!     &settings,
//!     registry.clone(),
//!     on_error,
//! )
//! .await?;
//!
//! let rs = engine.submit(RequestMessage::eval("g.V().count()")).await?;
//! println!("{:?}", rs.all().await?);
//! registry.remove(rs.request_id());
//!
//! engine.close(true).await?;
//! ```

pub mod transport;
mod auth;
mod config;
mod error;
mod protocol;
mod result_set;

// Re-exports
pub use auth::{AuthToken, BasicCredentials, CredentialProvider, NoopCredentials};
pub use config::{
    parse_http_endpoint, ConnectionSettings, ConnectionSettingsBuilder, TrustStrategy,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_AUTH_ATTEMPTS,
};
pub use error::{DriverError, DriverResult};
pub use protocol::{ErrorCallback, ProtocolEngine};
pub use result_set::{AggregateTo, ResultSet, ResultSetRegistry};
pub use transport::{Correlation, HttpTransport, Transport, TransportKind};
