//! One-shot HTTP transport.
//!
//! Each `write` POSTs one serialized request, reads the complete response
//! body and publishes it to the hand-off queue drained by `read`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::binary::GRAPHBINARY_MIME_TYPE;

use super::super::auth::CredentialProvider;
use super::super::config::{parse_http_endpoint, ConnectionSettings, TrustStrategy};
use super::super::error::{DriverError, DriverResult};
use super::{Correlation, Transport};

/// Sending half of the hand-off queue plus the closed flag, guarded together
/// so nothing is published after `close`.
struct Inbox {
    sender: Option<mpsc::UnboundedSender<Bytes>>,
    closed: bool,
}

/// One-shot request/response binding over HTTP.
pub struct HttpTransport {
    endpoint: Url,
    client: reqwest::Client,
    mime_type: &'static str,
    max_response_content_length: u64,
    auth: Arc<dyn CredentialProvider>,
    inbox: Mutex<Inbox>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    /// Serializes round trips so responses enter the queue in request order
    write_lock: tokio::sync::Mutex<()>,
    /// Fired by `close` to abandon an in-flight round trip
    cancel: CancellationToken,
}

impl HttpTransport {
    /// Create a transport for `endpoint` (e.g. `http://localhost:8182/gremlin`).
    pub fn new(endpoint: &str, settings: &ConnectionSettings) -> DriverResult<Self> {
        let endpoint = parse_http_endpoint(endpoint)?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent.clone());
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        if settings.trust_strategy == TrustStrategy::TrustAllCertificates {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| DriverError::transport(format!("Failed to build HTTP client: {}", e)))?;

        let (sender, receiver) = mpsc::unbounded_channel();

        Ok(Self {
            endpoint,
            client,
            mime_type: GRAPHBINARY_MIME_TYPE,
            max_response_content_length: settings.max_response_content_length,
            auth: settings.credential_provider(),
            inbox: Mutex::new(Inbox {
                sender: Some(sender),
                closed: false,
            }),
            receiver: tokio::sync::Mutex::new(receiver),
            write_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
        })
    }

    /// Target endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn check_length(&self, len: u64) -> DriverResult<()> {
        if self.max_response_content_length > 0 && len > self.max_response_content_length {
            return Err(DriverError::transport(format!(
                "Response exceeded {} bytes.",
                self.max_response_content_length
            )));
        }
        Ok(())
    }

    async fn round_trip(&self, data: Bytes) -> DriverResult<Bytes> {
        trace!(endpoint = %self.endpoint, bytes = data.len(), "Sending request");
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, self.mime_type)
            .header(ACCEPT, self.mime_type)
            .body(data);
        for (name, value) in self.auth.http_headers() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(map_http_error)?;
        let status = response.status();
        if let Some(len) = response.content_length() {
            self.check_length(len)?;
        }
        let body = response.bytes().await.map_err(map_http_error)?;
        self.check_length(body.len() as u64)?;
        if body.is_empty() {
            return Err(DriverError::transport(format!(
                "Empty response body (HTTP {})",
                status
            )));
        }

        trace!(status = %status, bytes = body.len(), "Received response");
        Ok(body)
    }

    fn publish(&self, body: Bytes) -> DriverResult<()> {
        let inbox = self.inbox.lock();
        if inbox.closed {
            return Err(DriverError::ConnectionClosed);
        }
        match &inbox.sender {
            Some(sender) => sender.send(body).map_err(|_| DriverError::ConnectionClosed),
            None => Err(DriverError::ConnectionClosed),
        }
    }
}

fn map_http_error(err: reqwest::Error) -> DriverError {
    if err.is_timeout() {
        DriverError::timeout(format!("HTTP round trip timed out: {}", err))
    } else {
        DriverError::transport(format!("HTTP request failed: {}", err))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> DriverResult<()> {
        debug!(endpoint = %self.endpoint, "HTTP transport ready");
        Ok(())
    }

    async fn write(&self, data: Bytes) -> DriverResult<()> {
        let _round_trip = self.write_lock.lock().await;
        if self.is_closed() {
            return Err(DriverError::ConnectionClosed);
        }

        let body = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(endpoint = %self.endpoint, "Round trip abandoned by close");
                return Err(DriverError::ConnectionClosed);
            }
            body = self.round_trip(data) => body?,
        };
        self.publish(body)
    }

    async fn read(&self) -> DriverResult<Bytes> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.ok_or(DriverError::ConnectionClosed)
    }

    async fn close(&self) -> DriverResult<()> {
        let mut inbox = self.inbox.lock();
        if !inbox.closed {
            inbox.closed = true;
            // dropping the sender ends `read` once buffered bodies are drained
            inbox.sender = None;
            self.cancel.cancel();
            debug!(endpoint = %self.endpoint, "HTTP transport closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inbox.lock().closed
    }

    fn auth_info(&self) -> Arc<dyn CredentialProvider> {
        self.auth.clone()
    }

    fn correlation(&self) -> Correlation {
        Correlation::LastSent
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("mime_type", &self.mime_type)
            .field("closed", &self.is_closed())
            .finish()
    }
}
