//! Test transport with scripted responses.

use crate::transport::{HttpTransport, TransportError, TransportRequest, TransportResponse};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

struct MockInner {
    queue: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<TransportRequest>>,
    gate: Mutex<bool>,
    released: Condvar,
}

/// An [`HttpTransport`] that replays scripted outcomes and records every
/// request it saw. [`MockTransport::hold`] keeps in-flight calls blocked
/// until [`MockTransport::release`], which lets tests race `abort()`
/// deterministically against completion.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    /// Creates an empty transport; unscripted calls fail.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                queue: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                gate: Mutex::new(false),
                released: Condvar::new(),
            }),
        }
    }

    /// Scripts a successful response.
    pub fn push_response(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        self.inner.queue.lock().push_back(Ok(TransportResponse {
            status,
            status_text: match status {
                200 => "OK".to_string(),
                404 => "Not Found".to_string(),
                other => other.to_string(),
            },
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: body.to_string(),
        }));
    }

    /// Scripts a transport failure.
    pub fn push_error(&self, message: &str) {
        self.inner
            .queue
            .lock()
            .push_back(Err(TransportError::Failed(message.to_string())));
    }

    /// Blocks subsequent `execute` calls until [`MockTransport::release`].
    pub fn hold(&self) {
        *self.inner.gate.lock() = true;
    }

    /// Releases calls blocked by [`MockTransport::hold`].
    pub fn release(&self) {
        *self.inner.gate.lock() = false;
        self.inner.released.notify_all();
    }

    /// Every request executed so far.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.inner.requests.lock().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for MockTransport {
    fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.inner.requests.lock().push(request);
        let mut gate = self.inner.gate.lock();
        while *gate {
            self.inner.released.wait(&mut gate);
        }
        drop(gate);
        self.inner
            .queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Failed("no scripted response".to_string())))
    }
}
