//! In-process transport for tests
//!
//! [`MockTransport`] records every request it receives and answers from a
//! queue of canned responses, so client behaviour can be checked without a
//! server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::{BoxFuture, HttpRequest, HttpResponse, Transport};

/// Recording transport with scripted responses.
///
/// Clones share state, so keep one handle for assertions and give another
/// to the client.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    requests: Vec<HttpRequest>,
    responses: VecDeque<HttpResponse>,
    hang: bool,
}

impl MockTransport {
    /// Transport with an empty response queue.
    /// Requests that find the queue empty fail with [`Error::Transport`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose requests never complete once the queue is empty
    pub fn hanging() -> Self {
        let transport = Self::new();
        transport.state().hang = true;
        transport
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a JSON response
    pub fn respond_json(&self, status: u16, body: Value) -> &Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.respond(HttpResponse {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers,
            body: Bytes::from(body.to_string()),
        })
    }

    /// Queue an arbitrary response
    pub fn respond(&self, response: HttpResponse) -> &Self {
        self.state().responses.push_back(response);
        self
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state().requests.clone()
    }

    /// Drain the recorded requests
    pub fn take_requests(&self) -> Vec<HttpRequest> {
        std::mem::take(&mut self.state().requests)
    }

    /// The most recent request
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.state().requests.last().cloned()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.state().requests.len()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        let (next, hang) = {
            let mut state = self.state();
            state.requests.push(request);
            (state.responses.pop_front(), state.hang)
        };

        Box::pin(async move {
            match next {
                Some(response) => Ok(response),
                None if hang => std::future::pending().await,
                None => Err(Error::Transport("no response queued".to_string())),
            }
        })
    }
}
