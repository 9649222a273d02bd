//! Result sets
//!
//! A [`ResultSet`] buffers the values produced for one exchange plus its
//! completion and error state. The receive loop fills it; the application
//! drains it with [`ResultSet::one`], [`ResultSet::all`] or
//! [`ResultSet::stream`].
//!
//! [`ResultSetRegistry`] maps correlation ids to result sets and is shared
//! between request issuers and the receive loop.
//!
//! # Example
//!
//! ```ignore
//! let rs = registry.register(request.request_id.clone())?;
//! engine.write(&request).await?;
//! let values = rs.all_timeout(Duration::from_secs(5)).await?;
//! registry.remove(rs.request_id());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::binary::{GraphValue, RequestId};

use super::error::{DriverError, DriverResult};

// ============================================================================
// AggregateTo - aggregation hint
// ============================================================================

/// How partial payloads of one exchange combine into a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateTo {
    /// Concatenate in arrival order
    List,
    /// Concatenate, dropping duplicates
    Set,
    /// Merge map entries, later keys win
    Map,
}

impl AggregateTo {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateTo::List => "list",
            AggregateTo::Set => "set",
            AggregateTo::Map => "map",
        }
    }
}

impl FromStr for AggregateTo {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "list" => Ok(AggregateTo::List),
            "set" | "bulkset" => Ok(AggregateTo::Set),
            "map" => Ok(AggregateTo::Map),
            other => Err(DriverError::result_set(format!("Unknown aggregation hint '{}'", other))),
        }
    }
}

impl fmt::Display for AggregateTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ResultSet
// ============================================================================

#[derive(Debug, Default)]
struct ResultSetState {
    results: Vec<GraphValue>,
    /// Index of the next value handed out by `one`/`all`
    cursor: usize,
    completed: bool,
    error: Option<DriverError>,
    aggregate_to: Option<AggregateTo>,
    status_attributes: Option<HashMap<String, GraphValue>>,
    auth_attempts: u32,
}

/// Values produced for one exchange, plus completion/error state.
///
/// Once completed, nothing more can be appended.
#[derive(Debug)]
pub struct ResultSet {
    request_id: RequestId,
    state: Mutex<ResultSetState>,
    notify: Notify,
}

impl ResultSet {
    /// Create an open, empty result set.
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            state: Mutex::new(ResultSetState::default()),
            notify: Notify::new(),
        }
    }

    /// Correlation id of the exchange.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Append a value. Fails once the set is completed.
    pub fn add_result(&self, value: GraphValue) -> DriverResult<()> {
        {
            let mut state = self.state.lock();
            if state.completed {
                return Err(DriverError::result_set(format!(
                    "Result set {} is already completed",
                    self.request_id
                )));
            }
            state.results.push(value);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Record status attributes. The first call wins.
    pub fn set_status_attributes(&self, attributes: HashMap<String, GraphValue>) {
        let mut state = self.state.lock();
        if state.status_attributes.is_none() {
            state.status_attributes = Some(attributes);
        }
    }

    /// Record the aggregation hint. The first call wins.
    pub fn set_aggregate_to(&self, aggregate_to: AggregateTo) {
        let mut state = self.state.lock();
        if state.aggregate_to.is_none() {
            state.aggregate_to = Some(aggregate_to);
        }
    }

    /// Record a terminal error and complete the set.
    ///
    /// Ignored when the set is already completed.
    pub fn set_error(&self, error: DriverError) {
        {
            let mut state = self.state.lock();
            if state.completed {
                return;
            }
            state.error = Some(error);
            state.completed = true;
        }
        self.notify.notify_waiters();
    }

    /// Mark the set completed and wake waiting consumers.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.completed {
                return;
            }
            state.completed = true;
        }
        self.notify.notify_waiters();
    }

    /// Count one more authentication retry, returning the new total.
    pub(crate) fn record_auth_attempt(&self) -> u32 {
        let mut state = self.state.lock();
        state.auth_attempts += 1;
        state.auth_attempts
    }

    /// Whether the exchange is finished.
    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    /// Terminal error, if any.
    pub fn error(&self) -> Option<DriverError> {
        self.state.lock().error.clone()
    }

    /// Snapshot of every value received so far, drained or not.
    pub fn results(&self) -> Vec<GraphValue> {
        self.state.lock().results.clone()
    }

    /// Status attributes of the final response.
    pub fn status_attributes(&self) -> Option<HashMap<String, GraphValue>> {
        self.state.lock().status_attributes.clone()
    }

    /// Aggregation hint.
    pub fn aggregate_to(&self) -> Option<AggregateTo> {
        self.state.lock().aggregate_to
    }

    /// Next unread value.
    ///
    /// Waits for data. Returns `Ok(None)` once the set is completed and
    /// drained. Buffered values are handed out before a terminal error.
    pub async fn one(&self) -> DriverResult<Option<GraphValue>> {
        self.wait_until(|state| {
            if state.cursor < state.results.len() {
                let value = state.results[state.cursor].clone();
                state.cursor += 1;
                return Some(Ok(Some(value)));
            }
            if let Some(err) = &state.error {
                return Some(Err(err.clone()));
            }
            if state.completed {
                return Some(Ok(None));
            }
            None
        })
        .await
    }

    /// Every unread value, once the exchange completes.
    pub async fn all(&self) -> DriverResult<Vec<GraphValue>> {
        self.wait_until(|state| {
            if !state.completed {
                return None;
            }
            if let Some(err) = &state.error {
                return Some(Err(err.clone()));
            }
            let values = state.results[state.cursor..].to_vec();
            state.cursor = state.results.len();
            Some(Ok(values))
        })
        .await
    }

    /// [`ResultSet::all`] with a deadline.
    pub async fn all_timeout(&self, timeout: Duration) -> DriverResult<Vec<GraphValue>> {
        tokio::time::timeout(timeout, self.all())
            .await
            .map_err(|_| {
                DriverError::timeout(format!(
                    "Result set {} not completed within {:?}",
                    self.request_id, timeout
                ))
            })?
    }

    /// Combine every payload according to the aggregation hint.
    ///
    /// Without a hint payloads combine as a list.
    pub async fn aggregate(&self) -> DriverResult<GraphValue> {
        let payloads = self.all().await?;
        Ok(aggregate_payloads(
            self.aggregate_to().unwrap_or(AggregateTo::List),
            payloads,
        ))
    }

    /// Stream of unread values; ends after completion, yields the error once.
    pub fn stream(self: Arc<Self>) -> impl Stream<Item = DriverResult<GraphValue>> + Send {
        futures::stream::unfold(Some(self), |rs| async move {
            let rs = rs?;
            match rs.one().await {
                Ok(Some(value)) => Some((Ok(value), Some(rs))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    async fn wait_until<T>(&self, mut check: impl FnMut(&mut ResultSetState) -> Option<T>) -> T {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let ready = {
                let mut state = self.state.lock();
                check(&mut state)
            };
            if let Some(value) = ready {
                return value;
            }
            notified.await;
        }
    }
}

fn aggregate_payloads(hint: AggregateTo, payloads: Vec<GraphValue>) -> GraphValue {
    match hint {
        AggregateTo::List => GraphValue::List(flatten(payloads)),
        AggregateTo::Set => {
            let mut unique: Vec<GraphValue> = Vec::new();
            for value in flatten(payloads) {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            GraphValue::Set(unique)
        }
        AggregateTo::Map => {
            let mut merged: Vec<(GraphValue, GraphValue)> = Vec::new();
            for entry in flatten(payloads) {
                let GraphValue::Map(entries) = entry else {
                    continue;
                };
                for (k, v) in entries {
                    match merged.iter_mut().find(|(existing, _)| *existing == k) {
                        Some(slot) => slot.1 = v,
                        None => merged.push((k, v)),
                    }
                }
            }
            GraphValue::Map(merged)
        }
    }
}

/// Unwrap list/set payloads one level; other payloads pass through as-is.
fn flatten(payloads: Vec<GraphValue>) -> Vec<GraphValue> {
    let mut out = Vec::new();
    for payload in payloads {
        match payload {
            GraphValue::List(items) | GraphValue::Set(items) => out.extend(items),
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// ResultSetRegistry
// ============================================================================

/// Concurrent mapping from correlation id to result set.
#[derive(Debug, Default)]
pub struct ResultSetRegistry {
    sets: RwLock<HashMap<RequestId, Arc<ResultSet>>>,
}

impl ResultSetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new exchange. Each id may be registered once.
    pub fn register(&self, request_id: RequestId) -> DriverResult<Arc<ResultSet>> {
        let mut sets = self.sets.write();
        if sets.contains_key(&request_id) {
            return Err(DriverError::DuplicateRequest(request_id));
        }
        let rs = Arc::new(ResultSet::new(request_id.clone()));
        sets.insert(request_id, rs.clone());
        Ok(rs)
    }

    /// Result set for an id, or `None` if it was never registered or was removed.
    pub fn load(&self, request_id: &RequestId) -> Option<Arc<ResultSet>> {
        self.sets.read().get(request_id).cloned()
    }

    /// Forget an exchange, usually after the application drained it.
    pub fn remove(&self, request_id: &RequestId) -> Option<Arc<ResultSet>> {
        self.sets.write().remove(request_id)
    }

    /// Forget every completed exchange, returning how many were removed.
    pub fn purge_completed(&self) -> usize {
        let mut sets = self.sets.write();
        let before = sets.len();
        sets.retain(|_, rs| !rs.is_completed());
        before - sets.len()
    }

    /// Attach an error to every open result set, returning how many were affected.
    pub fn fail_open(&self, error: &DriverError) -> usize {
        let open: Vec<Arc<ResultSet>> = self
            .sets
            .read()
            .values()
            .filter(|rs| !rs.is_completed())
            .cloned()
            .collect();
        for rs in &open {
            rs.set_error(error.clone());
        }
        open.len()
    }

    /// Number of registered exchanges.
    pub fn len(&self) -> usize {
        self.sets.read().len()
    }

    /// Whether no exchange is registered.
    pub fn is_empty(&self) -> bool {
        self.sets.read().is_empty()
    }

    /// Registered ids.
    pub fn ids(&self) -> Vec<RequestId> {
        self.sets.read().keys().cloned().collect()
    }
}
