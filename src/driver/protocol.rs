//! Protocol engine
//!
//! [`ProtocolEngine`] drives one connection. Callers serialize requests onto
//! the [`Transport`] through [`ProtocolEngine::write`]; a background receive
//! loop reads every response, stamps it with its correlation id and routes it
//! into the shared [`ResultSetRegistry`].
//!
//! ```text
//! caller ── write ──> codec ──> Transport::write
//!                                     │
//! receive loop <── Transport::read <──┘
//!   ├─ 204 no content   → empty result, complete
//!   ├─ 200 success      → payload + status attributes, complete
//!   ├─ 206 partial      → payload, stay open
//!   ├─ 407 / 151        → SASL retry with basic credentials, or auth error
//!   └─ anything else    → status error, complete
//! ```
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(ResultSetRegistry::new());
//! let on_error: ErrorCallback = Arc::new(|err: &DriverError| tracing::error!(%err, "connection lost"));
//! let engine = ProtocolEngine::new(
//!     TransportKind::Http,
//!     "http://localhost:8182/gremlin",
//!     &ConnectionSettings::default(),
//!     registry.clone(),
//!     on_error,
//! )
//! .await?;
//!
//! let rs = engine.submit(RequestMessage::eval("g.V().count()")).await?;
//! let values = rs.all().await?;
//! registry.remove(rs.request_id());
//! engine.close(true).await?;
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

use crate::binary::{
    status, GraphBinaryCodec, GraphValue, MessageCodec, RequestId, RequestMessage, ResponseMessage,
};

use super::config::ConnectionSettings;
use super::error::{DriverError, DriverResult};
use super::result_set::{AggregateTo, ResultSet, ResultSetRegistry};
use super::transport::{self, Correlation, Transport, TransportKind};

/// Invoked once per connection-fatal failure. Must not block.
pub type ErrorCallback = Arc<dyn Fn(&DriverError) + Send + Sync>;

// ============================================================================
// Shared engine state
// ============================================================================

/// Exchanges written but not yet answered.
#[derive(Debug, Default)]
struct Outstanding {
    /// Send order, used by bindings whose responses carry no id
    queue: VecDeque<RequestId>,
    /// Most recent request written
    last_sent: Option<RequestId>,
}

struct EngineShared {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn MessageCodec>,
    registry: Arc<ResultSetRegistry>,
    on_error: ErrorCallback,
    correlation: Correlation,
    max_auth_attempts: u32,
    outstanding: Mutex<Outstanding>,
    /// Keeps queue order identical to transport order
    write_lock: tokio::sync::Mutex<()>,
    /// Set once a deliberate close has started
    closing: AtomicBool,
}

impl EngineShared {
    async fn write(&self, request: &RequestMessage) -> DriverResult<()> {
        let bytes = self.codec.serialize_request(request)?;
        let request_id = request.request_id.clone();

        let _serial = self.write_lock.lock().await;
        {
            let mut outstanding = self.outstanding.lock();
            outstanding.last_sent = Some(request_id.clone());
            if self.correlation == Correlation::LastSent {
                outstanding.queue.push_back(request_id.clone());
            }
        }

        trace!(request_id = %request_id, op = %request.op, bytes = bytes.len(), "Writing request");
        if let Err(err) = self.transport.write(bytes).await {
            if self.correlation == Correlation::LastSent {
                let mut outstanding = self.outstanding.lock();
                if let Some(pos) = outstanding.queue.iter().rposition(|id| *id == request_id) {
                    outstanding.queue.remove(pos);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Correlation id for a response, or `None` if nothing was ever sent.
    fn correlate(&self, response: &ResponseMessage) -> Option<RequestId> {
        let mut outstanding = self.outstanding.lock();
        match self.correlation {
            Correlation::LastSent => {
                // a partial response leaves its exchange outstanding
                let next = if response.code() == status::PARTIAL_CONTENT {
                    outstanding.queue.front().cloned()
                } else {
                    outstanding.queue.pop_front()
                };
                next.or_else(|| outstanding.last_sent.clone())
            }
            Correlation::Embedded => response
                .request_id
                .clone()
                .or_else(|| outstanding.last_sent.clone()),
        }
    }

    async fn handle_response(
        &self,
        request_id: RequestId,
        response: ResponseMessage,
    ) -> DriverResult<()> {
        let rs = self
            .registry
            .load(&request_id)
            .ok_or_else(|| DriverError::Bookkeeping(request_id.clone()))?;

        if let Some(hint) = response.aggregate_to() {
            match hint.parse::<AggregateTo>() {
                Ok(aggregate_to) => rs.set_aggregate_to(aggregate_to),
                Err(err) => warn!(request_id = %request_id, error = %err, "Ignoring aggregation hint"),
            }
        }

        let ResponseMessage { status: st, result, .. } = response;
        match st.code {
            status::NO_CONTENT => {
                rs.add_result(GraphValue::List(Vec::new()))?;
                rs.close();
                debug!(request_id = %request_id, "Exchange complete (no content)");
            }
            status::SUCCESS => {
                rs.add_result(result.data)?;
                rs.set_status_attributes(st.attributes);
                rs.close();
                debug!(request_id = %request_id, "Exchange complete");
            }
            status::PARTIAL_CONTENT => {
                rs.add_result(result.data)?;
                trace!(request_id = %request_id, "Partial response");
            }
            code if status::is_auth_challenge(code) => {
                self.answer_challenge(&rs).await?;
            }
            code => {
                let err = DriverError::status(code, st.message, st.attributes);
                error!(request_id = %request_id, code, error = %err, "Exchange failed");
                rs.set_error(err);
            }
        }
        Ok(())
    }

    /// Resend the exchange as a SASL PLAIN authentication request, or fail it.
    async fn answer_challenge(&self, rs: &ResultSet) -> DriverResult<()> {
        let provider = self.transport.auth_info();
        let Some(credentials) = provider.basic_credentials() else {
            warn!(request_id = %rs.request_id(), "Authentication requested but no credentials configured");
            rs.set_error(DriverError::authentication(
                "Server requested authentication but no basic credentials are configured",
            ));
            return Ok(());
        };

        let attempt = rs.record_auth_attempt();
        if attempt > self.max_auth_attempts {
            warn!(request_id = %rs.request_id(), attempts = attempt - 1, "Authentication rejected");
            rs.set_error(DriverError::authentication(format!(
                "Server rejected credentials after {} attempt(s)",
                attempt - 1
            )));
            return Ok(());
        }

        debug!(request_id = %rs.request_id(), attempt, "Answering authentication challenge");
        let retry = RequestMessage::authentication(rs.request_id().clone(), credentials.sasl_payload());
        self.write(&retry).await
    }

    /// Shared failure path for everything that ends the receive loop.
    fn terminate(&self, err: DriverError) {
        if self.closing.load(Ordering::SeqCst) {
            let failed = self.registry.fail_open(&DriverError::ConnectionClosed);
            debug!(open_exchanges = failed, "Receive loop stopped by close");
            return;
        }
        let failed = self.registry.fail_open(&err);
        error!(error = %err, open_exchanges = failed, "Connection failed");
        (self.on_error)(&err);
    }
}

/// Signals loop exit when dropped, even if the loop task panics.
struct LoopExit(watch::Sender<bool>);

impl Drop for LoopExit {
    fn drop(&mut self) {
        let _ = self.0.send(true);
    }
}

async fn receive_loop(shared: Arc<EngineShared>, _exit: LoopExit) {
    debug!(correlation = ?shared.correlation, "Receive loop started");
    loop {
        let data = match shared.transport.read().await {
            Ok(data) => data,
            Err(err) => {
                shared.terminate(err);
                break;
            }
        };

        let response = match shared.codec.deserialize_response(&data) {
            Ok(response) => response,
            Err(err) => {
                shared.terminate(err.into());
                break;
            }
        };

        let Some(request_id) = shared.correlate(&response) else {
            warn!(code = response.code(), "Dropping response with no correlation id");
            continue;
        };

        match shared.handle_response(request_id, response).await {
            Ok(()) => {}
            Err(err) if err.is_connection_fatal() => {
                shared.terminate(err);
                break;
            }
            Err(err @ DriverError::Bookkeeping(_)) => {
                warn!(error = %err, "Exchange abandoned");
            }
            Err(err) => {
                error!(error = %err, "Response handling failed");
            }
        }
    }
    debug!("Receive loop exited");
}

// ============================================================================
// ProtocolEngine
// ============================================================================

/// One connection's request/response engine.
pub struct ProtocolEngine {
    shared: Arc<EngineShared>,
    /// Whether `close` already closed the transport
    closed: tokio::sync::Mutex<bool>,
    loop_exited: watch::Receiver<bool>,
}

impl ProtocolEngine {
    /// Build a transport of `kind`, connect it and start the receive loop.
    pub async fn new(
        kind: TransportKind,
        endpoint: &str,
        settings: &ConnectionSettings,
        registry: Arc<ResultSetRegistry>,
        on_error: ErrorCallback,
    ) -> DriverResult<Self> {
        let transport = transport::create(kind, endpoint, settings)?;
        Self::with_transport(
            transport,
            Arc::new(GraphBinaryCodec::new()),
            registry,
            on_error,
            settings.max_auth_attempts,
        )
        .await
    }

    /// Connect an existing transport and start the receive loop.
    pub async fn with_transport(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn MessageCodec>,
        registry: Arc<ResultSetRegistry>,
        on_error: ErrorCallback,
        max_auth_attempts: u32,
    ) -> DriverResult<Self> {
        transport.connect().await?;

        let shared = Arc::new(EngineShared {
            correlation: transport.correlation(),
            transport,
            codec,
            registry,
            on_error,
            max_auth_attempts,
            outstanding: Mutex::new(Outstanding::default()),
            write_lock: tokio::sync::Mutex::new(()),
            closing: AtomicBool::new(false),
        });

        let (exit_tx, exit_rx) = watch::channel(false);
        tokio::spawn(receive_loop(shared.clone(), LoopExit(exit_tx)));

        Ok(Self {
            shared,
            closed: tokio::sync::Mutex::new(false),
            loop_exited: exit_rx,
        })
    }

    /// Serialize `request` and hand it to the transport.
    ///
    /// The registry is not touched; register the exchange first or use
    /// [`ProtocolEngine::submit`].
    pub async fn write(&self, request: &RequestMessage) -> DriverResult<()> {
        self.shared.write(request).await
    }

    /// Register an exchange for `request` and write it.
    ///
    /// On write failure the exchange is removed again.
    pub async fn submit(&self, request: RequestMessage) -> DriverResult<Arc<ResultSet>> {
        let rs = self.shared.registry.register(request.request_id.clone())?;
        if let Err(err) = self.shared.write(&request).await {
            self.shared.registry.remove(&request.request_id);
            return Err(err);
        }
        Ok(rs)
    }

    /// Close the transport. Only the first call closes it; with `wait`, every
    /// caller returns once the receive loop has exited.
    pub async fn close(&self, wait: bool) -> DriverResult<()> {
        let result = {
            let mut closed = self.closed.lock().await;
            if *closed {
                Ok(())
            } else {
                *closed = true;
                self.shared.closing.store(true, Ordering::SeqCst);
                debug!("Closing protocol engine");
                self.shared.transport.close().await
            }
        };
        if wait {
            self.wait_loop_exit().await;
        }
        result
    }

    /// Wait until the receive loop has exited.
    pub async fn wait_loop_exit(&self) {
        let mut exited = self.loop_exited.clone();
        let _ = exited.wait_for(|done| *done).await;
    }

    /// Whether a deliberate close has started.
    pub fn is_closed(&self) -> bool {
        self.shared.closing.load(Ordering::SeqCst)
    }

    /// Whether the receive loop is still running.
    pub fn is_running(&self) -> bool {
        !*self.loop_exited.borrow()
    }

    /// Registry shared with the receive loop.
    pub fn registry(&self) -> &Arc<ResultSetRegistry> {
        &self.shared.registry
    }

    /// Underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.shared.transport
    }
}

impl Drop for ProtocolEngine {
    fn drop(&mut self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        // close without waiting so the loop does not outlive the engine
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let transport = self.shared.transport.clone();
            handle.spawn(async move {
                if let Err(err) = transport.close().await {
                    warn!(error = %err, "Transport close on drop failed");
                }
            });
        }
    }
}

impl fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("transport", &self.shared.transport)
            .field("correlation", &self.shared.correlation)
            .field("closed", &self.is_closed())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::AGGREGATE_TO_KEY;
    use crate::driver::auth::AuthToken;
    use crate::driver::transport::mock::MockTransport;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        engine: ProtocolEngine,
        mock: Arc<MockTransport>,
        registry: Arc<ResultSetRegistry>,
        failures: Arc<Mutex<Vec<DriverError>>>,
    }

    async fn start(mock: MockTransport) -> Harness {
        start_with(mock, 1).await
    }

    async fn start_with(mock: MockTransport, max_auth_attempts: u32) -> Harness {
        let mock = Arc::new(mock);
        let registry = Arc::new(ResultSetRegistry::new());
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let on_error: ErrorCallback = Arc::new(move |err: &DriverError| sink.lock().push(err.clone()));

        let engine = ProtocolEngine::with_transport(
            mock.clone(),
            Arc::new(GraphBinaryCodec::new()),
            registry.clone(),
            on_error,
            max_auth_attempts,
        )
        .await
        .unwrap();

        Harness {
            engine,
            mock,
            registry,
            failures,
        }
    }

    fn ints(values: &[i32]) -> GraphValue {
        GraphValue::List(values.iter().map(|v| GraphValue::Int(*v)).collect())
    }

    fn basic() -> AuthToken {
        AuthToken::basic("user", "pass")
    }

    async fn wait_for_loop_exit(engine: &ProtocolEngine) {
        tokio::time::timeout(WAIT, engine.wait_loop_exit())
            .await
            .expect("receive loop did not exit");
    }

    #[tokio::test]
    async fn test_success_completes_with_payload_and_attributes() {
        let h = start(MockTransport::new().with_responder(|_| {
            vec![ResponseMessage::new(status::SUCCESS, ints(&[1, 2, 3])).with_attribute("host", "10.0.0.1")]
        }))
        .await;

        let rs = h.registry.register("xyz".into()).unwrap();
        h.engine
            .write(&RequestMessage::eval_with_id("xyz".into(), "g.V()"))
            .await
            .unwrap();

        let values = rs.all_timeout(WAIT).await.unwrap();
        assert_eq!(values, vec![ints(&[1, 2, 3])]);

        let loaded = h.registry.load(&"xyz".into()).unwrap();
        assert!(loaded.is_completed());
        assert_eq!(loaded.results(), vec![ints(&[1, 2, 3])]);
        let mut expected = HashMap::new();
        expected.insert("host".to_string(), GraphValue::from("10.0.0.1"));
        assert_eq!(loaded.status_attributes(), Some(expected));
        assert!(loaded.error().is_none());
        assert!(h.failures.lock().is_empty());
    }

    #[tokio::test]
    async fn test_challenge_without_credentials_fails_exchange() {
        let h = start(MockTransport::new().with_responder(|_| {
            vec![ResponseMessage::new(status::PROXY_AUTHENTICATION_REQUIRED, GraphValue::Null)]
        }))
        .await;

        let rs = h.registry.register("abc123".into()).unwrap();
        h.engine
            .write(&RequestMessage::eval_with_id("abc123".into(), "g.V()"))
            .await
            .unwrap();

        let result = rs.all_timeout(WAIT).await;
        assert!(matches!(result, Err(DriverError::Authentication(_))));
        assert!(rs.is_completed());
        assert!(matches!(rs.error(), Some(DriverError::Authentication(_))));
        // no retry went out
        assert_eq!(h.mock.written().len(), 1);
        assert!(h.failures.lock().is_empty());
        assert!(h.engine.is_running());
    }

    #[tokio::test]
    async fn test_challenge_alias_retries_with_sasl_payload() {
        let mock = MockTransport::new().with_auth(basic()).with_responder(|req| {
            if req.is_authentication() {
                vec![ResponseMessage::new(status::SUCCESS, ints(&[7]))]
            } else {
                vec![ResponseMessage::new(status::AUTHENTICATE, GraphValue::Null)]
            }
        });
        let h = start(mock).await;

        let rs = h.engine
            .submit(RequestMessage::eval_with_id("auth-1".into(), "g.V()"))
            .await
            .unwrap();
        assert_eq!(rs.all_timeout(WAIT).await.unwrap(), vec![ints(&[7])]);

        let written = h.mock.written();
        assert_eq!(written.len(), 2);
        let retry = &written[1];
        assert!(retry.is_authentication());
        assert_eq!(retry.request_id.as_str(), "auth-1");
        assert_eq!(
            retry.fields.get("sasl"),
            Some(&GraphValue::String("AHVzZXIAcGFzcw==".to_string()))
        );
    }

    #[tokio::test]
    async fn test_repeated_challenge_is_capped() {
        let mock = MockTransport::new().with_auth(basic()).with_responder(|_| {
            vec![ResponseMessage::new(status::PROXY_AUTHENTICATION_REQUIRED, GraphValue::Null)]
        });
        let h = start(mock).await;

        let rs = h.engine
            .submit(RequestMessage::eval_with_id("denied".into(), "g.V()"))
            .await
            .unwrap();
        assert!(matches!(rs.all_timeout(WAIT).await, Err(DriverError::Authentication(_))));
        // first request plus exactly one retry
        assert_eq!(h.mock.written().len(), 2);
        assert!(h.failures.lock().is_empty());
    }

    #[tokio::test]
    async fn test_auth_attempt_cap_is_configurable() {
        let mock = MockTransport::new().with_auth(basic()).with_responder(|_| {
            vec![ResponseMessage::new(status::PROXY_AUTHENTICATION_REQUIRED, GraphValue::Null)]
        });
        let h = start_with(mock, 3).await;

        let rs = h.engine
            .submit(RequestMessage::eval_with_id("denied".into(), "g.V()"))
            .await
            .unwrap();
        assert!(rs.all_timeout(WAIT).await.is_err());
        assert_eq!(h.mock.written().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_retry_write_is_connection_fatal() {
        let mock = MockTransport::new().with_auth(basic()).with_responder(|_| {
            vec![ResponseMessage::new(status::PROXY_AUTHENTICATION_REQUIRED, GraphValue::Null)]
        });
        let h = start(mock).await;
        h.mock.fail_writes_after(1);

        let rs = h.engine
            .submit(RequestMessage::eval_with_id("r".into(), "g.V()"))
            .await
            .unwrap();
        assert!(matches!(rs.all_timeout(WAIT).await, Err(DriverError::Transport(_))));

        wait_for_loop_exit(&h.engine).await;
        let failures = h.failures.lock();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], DriverError::Transport(_)));
    }

    #[tokio::test]
    async fn test_no_content_yields_one_empty_result() {
        let h = start(MockTransport::new().with_responder(|_| {
            vec![ResponseMessage::new(status::NO_CONTENT, GraphValue::Null)]
        }))
        .await;

        let rs = h.engine
            .submit(RequestMessage::eval_with_id("empty".into(), "g.V().drop()"))
            .await
            .unwrap();
        assert_eq!(rs.all_timeout(WAIT).await.unwrap(), vec![GraphValue::List(Vec::new())]);
        assert!(rs.is_completed());
        assert!(rs.status_attributes().is_none());
    }

    #[tokio::test]
    async fn test_partial_then_success_keeps_order() {
        let h = start(MockTransport::new().with_responder(|_| {
            vec![
                ResponseMessage::new(status::PARTIAL_CONTENT, ints(&[1])),
                ResponseMessage::new(status::SUCCESS, ints(&[2])),
            ]
        }))
        .await;

        let rs = h.engine
            .submit(RequestMessage::eval_with_id("stream".into(), "g.V()"))
            .await
            .unwrap();
        assert_eq!(rs.all_timeout(WAIT).await.unwrap(), vec![ints(&[1]), ints(&[2])]);
        assert_eq!(rs.results(), vec![ints(&[1]), ints(&[2])]);
    }

    #[tokio::test]
    async fn test_partial_leaves_set_open_until_success() {
        let h = start(MockTransport::new().with_correlation(Correlation::Embedded)).await;
        let rs = h.registry.register("p".into()).unwrap();

        h.mock.push_response(
            &ResponseMessage::new(status::PARTIAL_CONTENT, ints(&[1])).with_request_id("p".into()),
        );
        let first = tokio::time::timeout(WAIT, rs.one()).await.unwrap().unwrap();
        assert_eq!(first, Some(ints(&[1])));
        assert!(!rs.is_completed());

        h.mock
            .push_response(&ResponseMessage::new(status::SUCCESS, ints(&[2])).with_request_id("p".into()));
        assert_eq!(rs.all_timeout(WAIT).await.unwrap(), vec![ints(&[2])]);
        assert!(rs.is_completed());
        assert_eq!(rs.results(), vec![ints(&[1]), ints(&[2])]);
    }

    #[tokio::test]
    async fn test_aggregation_hint_recorded_once() {
        let h = start(MockTransport::new().with_correlation(Correlation::Embedded)).await;
        let rs = h.registry.register("agg".into()).unwrap();

        h.mock.push_response(
            &ResponseMessage::new(status::PARTIAL_CONTENT, ints(&[1, 2]))
                .with_request_id("agg".into())
                .with_meta(AGGREGATE_TO_KEY, "set"),
        );
        h.mock.push_response(
            &ResponseMessage::new(status::SUCCESS, ints(&[2, 3]))
                .with_request_id("agg".into())
                .with_meta(AGGREGATE_TO_KEY, "list"),
        );

        let aggregated = tokio::time::timeout(WAIT, rs.aggregate()).await.unwrap().unwrap();
        assert_eq!(rs.aggregate_to(), Some(AggregateTo::Set));
        assert_eq!(
            aggregated,
            GraphValue::Set(vec![GraphValue::Int(1), GraphValue::Int(2), GraphValue::Int(3)])
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_abandoned_and_loop_survives() {
        let h = start(MockTransport::new().with_correlation(Correlation::Embedded)).await;

        h.mock.push_response(
            &ResponseMessage::new(status::SUCCESS, ints(&[0])).with_request_id("ghost".into()),
        );
        let rs = h.registry.register("real".into()).unwrap();
        h.mock.push_response(
            &ResponseMessage::new(status::SUCCESS, ints(&[1])).with_request_id("real".into()),
        );

        assert_eq!(rs.all_timeout(WAIT).await.unwrap(), vec![ints(&[1])]);
        assert!(h.registry.load(&"ghost".into()).is_none());
        assert!(h.failures.lock().is_empty());
        assert!(h.engine.is_running());
    }

    #[tokio::test]
    async fn test_unregistered_write_does_not_disturb_next_exchange() {
        let h = start(MockTransport::new().with_responder(|req| {
            vec![ResponseMessage::new(status::SUCCESS, GraphValue::from(req.gremlin.as_str()))]
        }))
        .await;

        h.engine
            .write(&RequestMessage::eval_with_id("orphan".into(), "first"))
            .await
            .unwrap();
        let rs = h.engine
            .submit(RequestMessage::eval_with_id("tracked".into(), "second"))
            .await
            .unwrap();

        assert_eq!(rs.all_timeout(WAIT).await.unwrap(), vec![GraphValue::from("second")]);
        assert!(h.engine.is_running());
    }

    #[tokio::test]
    async fn test_embedded_response_without_id_uses_last_sent() {
        let h = start(
            MockTransport::new()
                .with_correlation(Correlation::Embedded)
                .with_responder(|_| vec![ResponseMessage::new(status::SUCCESS, ints(&[5]))]),
        )
        .await;

        let rs = h.engine
            .submit(RequestMessage::eval_with_id("anon".into(), "g.V()"))
            .await
            .unwrap();
        assert_eq!(rs.all_timeout(WAIT).await.unwrap(), vec![ints(&[5])]);
    }

    #[tokio::test]
    async fn test_other_status_attaches_status_error() {
        let h = start(MockTransport::new().with_responder(|_| {
            vec![ResponseMessage::new(500, GraphValue::Null)
                .with_message("boom")
                .with_attribute("exceptions", "ServerError")]
        }))
        .await;

        let rs = h.engine
            .submit(RequestMessage::eval_with_id("bad".into(), "g.V("))
            .await
            .unwrap();
        match rs.all_timeout(WAIT).await {
            Err(DriverError::Status {
                code,
                message,
                attributes,
            }) => {
                assert_eq!(code, 500);
                assert_eq!(message.as_deref(), Some("boom"));
                assert_eq!(attributes.get("exceptions"), Some(&GraphValue::from("ServerError")));
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert!(rs.is_completed());
        assert!(h.failures.lock().is_empty());
        // exactly one write, no automatic retry
        assert_eq!(h.mock.written().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_registry_untouched() {
        let h = start(MockTransport::new()).await;
        h.mock.fail_writes_after(0);

        let err = h
            .engine
            .write(&RequestMessage::eval_with_id("w".into(), "g.V()"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Transport(_)));
        assert!(h.registry.is_empty());

        let err = h
            .engine
            .submit(RequestMessage::eval_with_id("s".into(), "g.V()"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Transport(_)));
        assert!(h.registry.is_empty());
        assert!(h.failures.lock().is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_duplicate_id() {
        let h = start(MockTransport::new()).await;
        h.engine
            .submit(RequestMessage::eval_with_id("dup".into(), "g.V()"))
            .await
            .unwrap();
        let err = h
            .engine
            .submit(RequestMessage::eval_with_id("dup".into(), "g.V()"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::DuplicateRequest(_)));
        assert_eq!(h.mock.written().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_ends_loop_and_reports_once() {
        let h = start(MockTransport::new()).await;
        let open = h.registry.register("open".into()).unwrap();

        h.mock.push_raw(Bytes::from_static(&[0x00, 0x01]));
        wait_for_loop_exit(&h.engine).await;

        let failures = h.failures.lock().clone();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], DriverError::Codec(_)));
        assert!(matches!(open.error(), Some(DriverError::Codec(_))));
        assert!(!h.engine.is_running());
    }

    #[tokio::test]
    async fn test_unexpected_transport_close_is_reported() {
        let h = start(MockTransport::new()).await;
        let open = h.registry.register("open".into()).unwrap();

        h.mock.close().await.unwrap();
        wait_for_loop_exit(&h.engine).await;

        assert_eq!(h.failures.lock().clone(), vec![DriverError::ConnectionClosed]);
        assert_eq!(open.error(), Some(DriverError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_close_wait_stops_loop_quietly() {
        let h = start(MockTransport::new()).await;
        let open = h.registry.register("open".into()).unwrap();
        assert!(h.engine.is_running());

        tokio::time::timeout(WAIT, h.engine.close(true))
            .await
            .unwrap()
            .unwrap();
        assert!(!h.engine.is_running());
        assert!(h.engine.is_closed());
        assert_eq!(open.error(), Some(DriverError::ConnectionClosed));
        assert!(h.failures.lock().is_empty());
        assert_eq!(h.mock.close_calls(), 1);

        // second close neither re-closes nor blocks
        tokio::time::timeout(WAIT, h.engine.close(true))
            .await
            .unwrap()
            .unwrap();
        h.engine.close(false).await.unwrap();
        assert_eq!(h.mock.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_close_closes_transport_once() {
        let h = start(MockTransport::new()).await;
        let engine = Arc::new(h.engine);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.close(true).await }));
        }
        for handle in handles {
            tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
        }
        assert_eq!(h.mock.close_calls(), 1);
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let h = start(MockTransport::new()).await;
        h.engine.close(true).await.unwrap();
        let err = h
            .engine
            .write(&RequestMessage::eval("g.V()"))
            .await
            .unwrap_err();
        assert_eq!(err, DriverError::ConnectionClosed);
    }

    #[tokio::test]
    async fn test_connects_once_and_drop_closes_transport() {
        let mock = Arc::new(MockTransport::new());
        let engine = ProtocolEngine::with_transport(
            mock.clone(),
            Arc::new(GraphBinaryCodec::new()),
            Arc::new(ResultSetRegistry::new()),
            Arc::new(|_: &DriverError| {}),
            1,
        )
        .await
        .unwrap();
        assert_eq!(mock.connect_calls(), 1);

        drop(engine);
        tokio::time::timeout(WAIT, async {
            while !mock.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(mock.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_http_round_trip() {
        use crate::driver::transport::http::tests::serve_once;

        let reply = GraphBinaryCodec::new()
            .serialize_response(&ResponseMessage::new(status::SUCCESS, ints(&[1, 2, 3])))
            .unwrap();
        let (url, server) = serve_once(reply.to_vec(), None).await;

        let registry = Arc::new(ResultSetRegistry::new());
        let engine = ProtocolEngine::new(
            TransportKind::Http,
            &url,
            &ConnectionSettings::default(),
            registry.clone(),
            Arc::new(|_: &DriverError| {}),
        )
        .await
        .unwrap();

        let rs = engine
            .submit(RequestMessage::eval_with_id("xyz".into(), "g.V()"))
            .await
            .unwrap();
        assert_eq!(rs.all_timeout(WAIT).await.unwrap(), vec![ints(&[1, 2, 3])]);

        let captured = server.await.unwrap();
        let sent = GraphBinaryCodec::new().deserialize_request(&captured.body).unwrap();
        assert_eq!(sent.request_id.as_str(), "xyz");
        assert_eq!(sent.gremlin, "g.V()");

        engine.close(true).await.unwrap();
        assert!(registry.load(&"xyz".into()).unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_close_during_stalled_auth_retry() {
        use crate::driver::transport::http::tests::serve_then_stall;

        let challenge = GraphBinaryCodec::new()
            .serialize_response(&ResponseMessage::new(
                status::PROXY_AUTHENTICATION_REQUIRED,
                GraphValue::Null,
            ))
            .unwrap();
        let server = serve_then_stall(vec![challenge.to_vec()]).await;

        let settings = ConnectionSettings::builder()
            .with_auth(AuthToken::basic("user", "pass"))
            .build();
        let registry = Arc::new(ResultSetRegistry::new());
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let engine = ProtocolEngine::new(
            TransportKind::Http,
            &server.url,
            &settings,
            registry.clone(),
            Arc::new(move |err: &DriverError| sink.lock().push(err.clone())),
        )
        .await
        .unwrap();

        let rs = engine
            .submit(RequestMessage::eval_with_id("stalled".into(), "g.V()"))
            .await
            .unwrap();

        // the server never answers the retry
        let retry = tokio::time::timeout(WAIT, server.stalled).await.unwrap().unwrap();
        let retry = GraphBinaryCodec::new().deserialize_request(&retry.body).unwrap();
        assert!(retry.is_authentication());
        assert_eq!(retry.request_id.as_str(), "stalled");

        tokio::time::timeout(WAIT, engine.close(true))
            .await
            .expect("close blocked on the unanswered retry")
            .unwrap();
        assert!(!engine.is_running());
        assert!(rs.is_completed());
        assert_eq!(rs.error(), Some(DriverError::ConnectionClosed));
        assert!(failures.lock().is_empty());
    }

    #[tokio::test]
    async fn test_new_rejects_bad_endpoint() {
        let result = ProtocolEngine::new(
            TransportKind::Http,
            "ftp://localhost/gremlin",
            &ConnectionSettings::default(),
            Arc::new(ResultSetRegistry::new()),
            Arc::new(|_: &DriverError| {}),
        )
        .await;
        assert!(matches!(result, Err(DriverError::Configuration(_))));
    }
}
