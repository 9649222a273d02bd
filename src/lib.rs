//! # Gremlin Driver
//!
//! Protocol engine for talking to a Gremlin-compatible graph server over
//! GraphBinary.
//!
//! ## Features
//!
//! - **GraphBinary** - Typed value model and request/response envelopes
//! - **Async/Await** - Built on Tokio; one background receive task per connection
//! - **Pluggable transports** - One-shot HTTP binding included, persistent bindings fit the same trait
//! - **Authentication** - SASL PLAIN retry on server challenge, bearer tokens over HTTP
//! - **Result sets** - Per-exchange buffers with blocking, streaming and aggregated access
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gremlin_driver::{
//!     ConnectionSettings, DriverError, ErrorCallback, ProtocolEngine, RequestMessage, ResultSetRegistry,
//!     TransportKind,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(ResultSetRegistry::new());
//!     let on_error: ErrorCallback = Arc::new(|err: &DriverError| eprintln!("connection failed: {}", err));
//!
//!     let engine = ProtocolEngine::new(
//!         TransportKind::Http,
//!         "http://localhost:8182/gremlin",
//!         &ConnectionSettings::default(),
//!         registry.clone(),
//!         on_error,
//!     )
//!     .await?;
//!
//!     let request = RequestMessage::eval("g.V().has('name', name).values('age')")
//!         .with_binding("name", "marko");
//!     let rs = engine.submit(request).await?;
//!
//!     for value in rs.all().await? {
//!         println!("{}", value);
//!     }
//!     registry.remove(rs.request_id());
//!
//!     engine.close(true).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Authentication
//!
//! ```rust
//! use gremlin_driver::{AuthToken, ConnectionSettings};
//!
//! // Answered with a SASL PLAIN retry when the server challenges (407 / 151)
//! let settings = ConnectionSettings::builder()
//!     .with_auth(AuthToken::basic("username", "password"))
//!     .build();
//!
//! // Sent as an `authorization` header on every HTTP request
//! let auth = AuthToken::bearer("my-token");
//! ```
//!
//! ## Value Types
//!
//! ```rust
//! use gremlin_driver::GraphValue;
//!
//! let null = GraphValue::Null;
//! let int = GraphValue::Int(42);
//! let long = GraphValue::Long(1 << 40);
//! let string = GraphValue::from("hello");
//! let list = GraphValue::from(vec![1i32, 2, 3]);
//! ```
//!
//! ## Error Handling
//!
//! Exchange-scoped failures (authentication, status) land on the result set;
//! connection-scoped failures (transport, codec) also reach the error callback.
//!
//! ```rust,no_run
//! # use gremlin_driver::{DriverError, ResultSet};
//! # async fn example(rs: &ResultSet) {
//! match rs.all().await {
//!     Ok(values) => println!("{} values", values.len()),
//!     Err(DriverError::Authentication(msg)) => eprintln!("auth failed: {}", msg),
//!     Err(DriverError::Status { code, .. }) => eprintln!("server returned {}", code),
//!     Err(e) => eprintln!("error: {}", e),
//! }
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Protocol engine, result sets, transports, settings
//! - [`binary`] - GraphBinary values, envelopes and codec
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod binary;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    AggregateTo, AuthToken, ConnectionSettings, ConnectionSettingsBuilder, CredentialProvider,
    DriverError, DriverResult, ErrorCallback, HttpTransport, ProtocolEngine, ResultSet,
    ResultSetRegistry, Transport, TransportKind, TrustStrategy,
};

pub use binary::{
    CodecError, GraphBinaryCodec, GraphValue, MessageCodec, RequestId, RequestMessage,
    ResponseMessage,
};
