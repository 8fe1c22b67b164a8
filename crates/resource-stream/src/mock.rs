//! # Mock Transport & Testing Guide
//!
//! [`MockTransport`] answers [`ApiRequest`]s from an in-memory expectation
//! queue instead of a server. It lets tests script exactly what the "server"
//! returns, inject failures, and verify which requests a resource or a
//! pipeline actually sent.
//!
//! ## When to use which helper
//!
//! | Helper | Responses | Use case |
//! |--------|-----------|----------|
//! | [`MockTransport`] | Scripted up front (`return_ok`, `return_err`) | Resource operations, pipeline behaviour |
//! | [`create_mock_transport`] | Sent by the test, one request at a time | Ordering and cancellation tests |
//! | A real backend (see the sample crate) | Computed from state | End-to-end flows |
//!
//! ## Scripted responses
//!
//! ```rust
//! use resource_stream::mock::MockTransport;
//! use resource_stream::resource::Resource;
//! use resource_stream::error::TransportError;
//! use serde_json::{json, Map, Value};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockTransport::new();
//!     mock.expect_get("posts").return_ok(json!({"data": [{"id": 1}]}));
//!     mock.expect_get("posts").return_err(TransportError::Unreachable("offline".into()));
//!
//!     let posts = Resource::<Value>::builder("posts").build(mock.transport());
//!     assert_eq!(posts.fetch_collection(Map::new()).await.unwrap().len(), 1);
//!     assert!(posts.fetch_collection(Map::new()).await.is_err());
//!
//!     mock.verify();
//! }
//! ```
//!
//! Expectations are consumed in order. A request that does not match the
//! next expectation fails with [`TransportError::Unreachable`] and makes
//! [`MockTransport::verify`] panic, so mismatches inside background pipelines
//! are still reported by the test.

use crate::error::TransportError;
use crate::transport::{ApiRequest, HttpMethod, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

struct Expectation {
    method: HttpMethod,
    path: String,
    body: Option<Value>,
    delay: Option<Duration>,
    response: Result<Value, TransportError>,
}

#[derive(Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    received: Vec<ApiRequest>,
    mismatches: Vec<String>,
}

type SharedState = Arc<Mutex<MockState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A transport with expectation tracking for fluent testing.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: SharedState,
}

struct MockHandle {
    state: SharedState,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transport to hand to resources under test.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(MockHandle {
            state: self.state.clone(),
        })
    }

    /// Expects a request with `method` on `path` (prefix included).
    pub fn expect_request(
        &self,
        method: HttpMethod,
        path: impl Into<String>,
    ) -> ExpectationBuilder {
        ExpectationBuilder {
            method,
            path: path.into(),
            body: None,
            delay: None,
            state: self.state.clone(),
        }
    }

    pub fn expect_get(&self, path: impl Into<String>) -> ExpectationBuilder {
        self.expect_request(HttpMethod::Get, path)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.state).received.clone()
    }

    /// Requests that did not match the expectation queue.
    pub fn mismatches(&self) -> Vec<String> {
        lock(&self.state).mismatches.clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.state).expectations.len()
    }

    /// Verifies that all expectations were met and nothing unexpected arrived.
    ///
    /// # Panics
    /// On any mismatch or leftover expectation.
    pub fn verify(&self) {
        let state = lock(&self.state);
        if !state.mismatches.is_empty() {
            panic!("Unexpected requests: {:?}", state.mismatches);
        }
        if !state.expectations.is_empty() {
            panic!(
                "Not all expectations were met. {} remaining",
                state.expectations.len()
            );
        }
    }
}

/// Builder for one expected request.
pub struct ExpectationBuilder {
    method: HttpMethod,
    path: String,
    body: Option<Value>,
    delay: Option<Duration>,
    state: SharedState,
}

impl ExpectationBuilder {
    /// Also requires the request body to equal `body`.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Holds the response back for `delay`.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the expectation to return a successful payload.
    pub fn return_ok(self, payload: Value) {
        self.push(Ok(payload));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: TransportError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<Value, TransportError>) {
        let mut state = lock(&self.state);
        state.expectations.push_back(Expectation {
            method: self.method,
            path: self.path,
            body: self.body,
            delay: self.delay,
            response,
        });
    }
}

#[async_trait]
impl Transport for MockHandle {
    async fn request(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let path = request.full_path();
        debug!(method = %request.method, %path, "Mock transport received request");

        let outcome = {
            let mut state = lock(&self.state);
            state.received.push(request.clone());
            let expectation = state.expectations.pop_front();
            match expectation {
                Some(expected)
                    if expected.method == request.method
                        && expected.path == path
                        && expected.body.as_ref().map_or(true, |body| *body == request.body) =>
                {
                    Ok((expected.delay, expected.response))
                }
                Some(expected) => {
                    let mismatch = format!(
                        "expected {} {} {:?}, got {} {} {}",
                        expected.method,
                        expected.path,
                        expected.body,
                        request.method,
                        path,
                        request.body
                    );
                    state.mismatches.push(mismatch.clone());
                    Err(mismatch)
                }
                None => {
                    let mismatch = format!("no expectation left for {} {}", request.method, path);
                    state.mismatches.push(mismatch.clone());
                    Err(mismatch)
                }
            }
        };

        match outcome {
            Ok((delay, response)) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                response
            }
            Err(mismatch) => Err(TransportError::Unreachable(mismatch)),
        }
    }
}

// =============================================================================
// CHANNEL HELPERS
// =============================================================================

/// A request waiting for the test to answer it.
pub struct PendingRequest {
    pub request: ApiRequest,
    pub respond_to: oneshot::Sender<Result<Value, TransportError>>,
}

impl PendingRequest {
    pub fn respond(self, response: Result<Value, TransportError>) {
        let _ = self.respond_to.send(response);
    }
}

struct ChannelTransport {
    sender: mpsc::Sender<PendingRequest>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(PendingRequest {
                request,
                respond_to,
            })
            .await
            .map_err(|_| TransportError::Closed)?;
        response.await.map_err(|_| TransportError::Closed)?
    }
}

/// Creates a transport whose requests arrive on the returned receiver.
///
/// The test answers each [`PendingRequest`] itself, which makes it possible to
/// hold a response back, answer out of order, or observe that a request was
/// abandoned (its `respond_to` is closed).
pub fn create_mock_transport(
    buffer_size: usize,
) -> (Arc<dyn Transport>, mpsc::Receiver<PendingRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (Arc::new(ChannelTransport { sender }), receiver)
}

/// Helper to receive the next request sent through a channel transport.
pub async fn expect_request(
    receiver: &mut mpsc::Receiver<PendingRequest>,
) -> Option<PendingRequest> {
    receiver.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mismatch_is_reported() {
        let mock = MockTransport::new();
        mock.expect_get("posts").return_ok(json!([]));
        let transport = mock.transport();

        let result = transport.request(ApiRequest::get("comments")).await;
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
        assert_eq!(mock.requests().len(), 1);

        assert_eq!(mock.mismatches().len(), 1);
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn test_channel_transport_round_trip() {
        let (transport, mut receiver) = create_mock_transport(4);
        let call = tokio::spawn(async move { transport.request(ApiRequest::get("posts")).await });

        let pending = expect_request(&mut receiver).await.unwrap();
        assert_eq!(pending.request.path, "posts");
        pending.respond(Ok(json!({"ok": true})));

        assert_eq!(call.await.unwrap(), Ok(json!({"ok": true})));
    }
}
