//! HTTP transport behind the request polyfill.
//!
//! The state machine never talks to the network directly; it hands a
//! [`TransportRequest`] to an [`HttpTransport`] on a worker thread and
//! receives the outcome back on the execution lane. The production
//! transport is a blocking `ureq` client; tests substitute
//! [`testing::MockTransport`].

use thiserror::Error;
use url::Url;

/// An outgoing request, fully assembled by the state machine.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method verb.
    pub method: String,
    /// Parsed target.
    pub url: Url,
    /// Request headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Text body, when the caller supplied one.
    pub body: Option<String>,
}

/// A structured response. HTTP error statuses are still responses; only
/// transport-level failures become [`TransportError`].
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Status reason phrase.
    pub status_text: String,
    /// Response headers as received.
    pub headers: Vec<(String, String)>,
    /// Response body decoded as text.
    pub body: String,
}

/// Transport-level failure (DNS, connect, TLS, read).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a structured response.
    #[error("request failed: {0}")]
    Failed(String),
}

/// The blocking call the state machine issues from its worker thread.
pub trait HttpTransport: Send + Sync {
    /// Executes the request, blocking until the response is complete.
    fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Production transport over a blocking `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Creates a transport with a default agent.
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for UreqTransport {
    fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut call = self.agent.request_url(&request.method, &request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }
        let response = match request.body {
            Some(body) => call.send_string(&body),
            None => call.call(),
        };
        let response = match response {
            Ok(response) => response,
            // non-2xx statuses are still structured responses
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(TransportError::Failed(transport.to_string()))
            }
        };

        let status = response.status();
        let status_text = response.status_text().to_string();
        let headers = response
            .headers_names()
            .into_iter()
            .filter_map(|name| {
                response
                    .header(&name)
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect();
        let body = response
            .into_string()
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        Ok(TransportResponse {
            status,
            status_text,
            headers,
            body,
        })
    }
}
