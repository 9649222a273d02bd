//! Scripted in-memory transport for engine tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::binary::{GraphBinaryCodec, RequestMessage, ResponseMessage};

use super::super::auth::{AuthToken, CredentialProvider};
use super::super::error::{DriverError, DriverResult};
use super::{Correlation, Transport};

/// Produces the responses for one written request.
pub(crate) type Responder = Box<dyn Fn(&RequestMessage) -> Vec<ResponseMessage> + Send + Sync>;

struct Inbox {
    sender: Option<mpsc::UnboundedSender<Bytes>>,
    closed: bool,
}

pub(crate) struct MockTransport {
    codec: GraphBinaryCodec,
    correlation: Correlation,
    auth: AuthToken,
    responder: Mutex<Option<Responder>>,
    written: Mutex<Vec<RequestMessage>>,
    /// Writes allowed before every further write fails
    write_budget: Mutex<Option<usize>>,
    inbox: Mutex<Inbox>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            codec: GraphBinaryCodec::new(),
            correlation: Correlation::LastSent,
            auth: AuthToken::None,
            responder: Mutex::new(None),
            written: Mutex::new(Vec::new()),
            write_budget: Mutex::new(None),
            inbox: Mutex::new(Inbox {
                sender: Some(sender),
                closed: false,
            }),
            receiver: tokio::sync::Mutex::new(receiver),
            connect_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_correlation(mut self, correlation: Correlation) -> Self {
        self.correlation = correlation;
        self
    }

    pub(crate) fn with_auth(mut self, auth: AuthToken) -> Self {
        self.auth = auth;
        self
    }

    pub(crate) fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(&RequestMessage) -> Vec<ResponseMessage> + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Box::new(responder));
        self
    }

    /// Let `n` more writes succeed, then fail every write.
    pub(crate) fn fail_writes_after(&self, n: usize) {
        *self.write_budget.lock() = Some(n);
    }

    /// Queue a response as if the server had sent it unprompted.
    pub(crate) fn push_response(&self, response: &ResponseMessage) {
        let bytes = self.codec.serialize_response(response).unwrap();
        self.push_raw(bytes);
    }

    pub(crate) fn push_raw(&self, bytes: Bytes) {
        let inbox = self.inbox.lock();
        if let Some(sender) = &inbox.sender {
            sender.send(bytes).unwrap();
        }
    }

    /// Requests written so far, decoded.
    pub(crate) fn written(&self) -> Vec<RequestMessage> {
        self.written.lock().clone()
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> DriverResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, data: Bytes) -> DriverResult<()> {
        if self.is_closed() {
            return Err(DriverError::ConnectionClosed);
        }
        {
            let mut budget = self.write_budget.lock();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(DriverError::transport("injected write failure"));
                }
                *remaining -= 1;
            }
        }

        let request = self.codec.deserialize_request(&data)?;
        self.written.lock().push(request.clone());

        let responses = match self.responder.lock().as_ref() {
            Some(responder) => responder(&request),
            None => Vec::new(),
        };
        for response in &responses {
            self.push_response(response);
        }
        Ok(())
    }

    async fn read(&self) -> DriverResult<Bytes> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.ok_or(DriverError::ConnectionClosed)
    }

    async fn close(&self) -> DriverResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut inbox = self.inbox.lock();
        inbox.closed = true;
        inbox.sender = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inbox.lock().closed
    }

    fn auth_info(&self) -> Arc<dyn CredentialProvider> {
        Arc::new(self.auth.clone())
    }

    fn correlation(&self) -> Correlation {
        self.correlation
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("correlation", &self.correlation)
            .field("closed", &self.is_closed())
            .finish()
    }
}
