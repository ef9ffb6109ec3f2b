//! Upstream HTTP client interface.
//!
//! The session core drives one [`UpstreamRequest`] at a time, created
//! through the [`HttpClientManager`] at the start of each target attempt
//! and dropped on completion or retry. The transport behind the trait
//! emits ready-read, bytes-written, and error events back into the core
//! as calls on the session's `upstream_*` methods.

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

/// Error classification reported by the upstream transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCondition {
    /// Could not connect to the target.
    Connect,
    /// Connection attempt timed out.
    ConnectTimeout,
    /// TLS negotiation or validation failed.
    Tls,
    /// The transport requires a Content-Length it was not given.
    LengthRequired,
    /// Any other failure.
    Other,
}

impl ErrorCondition {
    /// Whether the session may transparently retry on the next target.
    /// Only pre-connection failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCondition::Connect | ErrorCondition::ConnectTimeout | ErrorCondition::Tls
        )
    }
}

/// One in-flight upstream request.
pub trait UpstreamRequest {
    /// Authorize the transport to bypass its policy checks.
    fn set_ignore_policies(&mut self, on: bool);

    /// Authorize the transport to ignore TLS validation errors.
    fn set_ignore_tls_errors(&mut self, on: bool);

    fn set_connect_host(&mut self, host: &str);

    fn set_connect_port(&mut self, port: u16);

    fn start(&mut self, method: &Method, uri: &Uri, headers: &HeaderMap);

    fn write_body(&mut self, body: Bytes);

    fn end_body(&mut self);

    /// Read up to `max` bytes of response body.
    fn read_body(&mut self, max: usize) -> Bytes;

    fn response_code(&self) -> u16;

    fn response_reason(&self) -> String;

    fn response_headers(&self) -> HeaderMap;

    /// True once the response has been fully received.
    fn is_finished(&self) -> bool;

    /// Classification of the most recent error event.
    fn error_condition(&self) -> ErrorCondition;
}

/// Factory for upstream requests.
pub trait HttpClientManager {
    fn create_request(&self) -> Box<dyn UpstreamRequest>;
}
