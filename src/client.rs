//! Inbound client request-session interface.
//!
//! A [`ClientRequestSession`] is one downstream client request attached
//! to a proxy session. The session core owns it for the lifetime of its
//! entry: it reads request data and (for the primary client) streams the
//! request body, writes the response back, and pauses the client when the
//! exchange is handed off to the long-poll subsystem.
//!
//! The transport behind the trait emits events back into the core
//! (bytes-written acks, error-while-responding, finished, paused, and
//! ready-read on the request stream) as calls on the session's
//! corresponding `client_*` / `request_*` methods.

use std::net::IpAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

/// Request identity: the transport sender address plus its per-sender id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rid {
    pub sender: String,
    pub id: String,
}

impl Rid {
    pub fn new(sender: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            id: id.into(),
        }
    }
}

/// Snapshot of a client request.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Snapshot of an upstream response.
#[derive(Debug, Clone, Default)]
pub struct ResponseData {
    pub code: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Transport-level resumption snapshot captured at handoff.
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    /// Sequence number of the last message received from the client.
    pub in_seq: u32,
    /// Sequence number of the next message to send to the client.
    pub out_seq: u32,
    /// Outgoing flow-control credits remaining.
    pub out_credits: u32,
    /// Opaque transport user data, carried through verbatim.
    pub user_data: serde_json::Value,
}

/// One attached downstream client request.
pub trait ClientRequestSession {
    fn rid(&self) -> Rid;

    /// The request as received, including any body bytes that arrived
    /// before attachment.
    fn request_data(&self) -> RequestData;

    fn is_https(&self) -> bool;

    /// True when this session is a replay of a previously handed-off
    /// request; replays carry their full body in `request_data` and have
    /// no live request stream.
    fn is_retry(&self) -> bool;

    fn peer_address(&self) -> Option<IpAddr>;

    fn auto_cross_origin(&self) -> bool;

    fn jsonp_callback(&self) -> Option<String>;

    /// Resumption snapshot of the client's transport.
    fn server_state(&self) -> ServerState;

    /// Drain whatever request body bytes are currently available.
    fn read_body(&mut self) -> Bytes;

    /// True once the client's request body is complete.
    fn is_input_finished(&self) -> bool;

    fn start_response(&mut self, code: u16, reason: &str, headers: &HeaderMap);

    fn write_response_body(&mut self, body: Bytes);

    fn end_response_body(&mut self);

    /// Respond with a gateway error page.
    fn respond_error(&mut self, code: u16, reason: &str, message: &str);

    /// Respond with the gateway's cannot-accept error page.
    fn respond_cannot_accept(&mut self);

    /// Begin pausing the client connection; the transport confirms with
    /// a paused event.
    fn pause(&mut self);
}
