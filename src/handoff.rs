//! Accept handoff snapshot.
//!
//! When an upstream response carries a GRIP instruct, the session pauses
//! every attached client and emits an [`AcceptHandoff`]: everything the
//! long-poll subsystem needs to adopt the exchange. That is one
//! resumption record per client, the rewritten request, the buffered
//! instruct response, and the routing prefix for channel names.

use std::net::IpAddr;

use crate::client::{RequestData, ResponseData, Rid};

/// Per-client resumption data captured at handoff.
#[derive(Debug, Clone)]
pub struct ResumptionRecord {
    pub rid: Rid,
    pub https: bool,
    pub peer_address: Option<IpAddr>,
    pub auto_cross_origin: bool,
    pub jsonp_callback: Option<String>,
    /// Sequence number of the last message received from the client.
    pub in_seq: u32,
    /// Sequence number of the next message to send to the client.
    pub out_seq: u32,
    /// Outgoing flow-control credits remaining.
    pub out_credits: u32,
    /// Opaque transport user data.
    pub user_data: serde_json::Value,
}

/// Snapshot value emitted with the `finishedForAccept` event.
#[derive(Debug)]
pub struct AcceptHandoff {
    /// One record per attached client, all paused.
    pub requests: Vec<ResumptionRecord>,
    /// The rewritten request, body drained from the session buffer.
    pub request: RequestData,
    /// Always true: the handoff carries the full instruct response.
    pub have_response: bool,
    /// The instruct response, body drained from the session buffer.
    pub response: ResponseData,
    /// Channel prefix from the resolved route.
    pub channel_prefix: String,
    /// Inspection payload stored via `set_inspect_data`, if any.
    pub inspect: Option<serde_json::Value>,
}
