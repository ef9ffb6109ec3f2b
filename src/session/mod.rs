//! Proxy session state machine.
//!
//! A [`ProxySession`] owns one logical proxied exchange: one upstream
//! request and any number of downstream client request-sessions attached
//! via [`add`](ProxySession::add). Identical client requests coalesce
//! onto the single upstream exchange and all receive the same response.
//!
//! The session moves through four states:
//!
//! ```text
//! Stopped ──first add──► Requesting
//! Requesting ──retryable target error──► Requesting   (next target)
//! Requesting ──headers, GRIP instruct──► Accepting
//! Requesting ──headers, otherwise──────► Responding
//! Accepting  ──all clients paused──► finishedForAccept
//! Responding ──all clients finished──► finishedByPassthrough
//! ```
//!
//! In Responding the response streams to every client, buffered up to
//! [`MAX_INITIAL_BUFFER`] so late-attached clients can be fast-forwarded;
//! once that buffer overflows, buffering is abandoned for good, new adds
//! are cut off, and upstream reads are gated on the slowest client. In
//! Accepting the whole instruct response is buffered (capped at
//! [`MAX_ACCEPT_RESPONSE_BODY`]) and the session ends by pausing every
//! client and emitting an [`AcceptHandoff`].
//!
//! Every inbound event (client attachment, client acks, upstream
//! readiness and errors) is a method on the session. Outbound
//! notifications are queued as [`SessionEvent`]s and drained by the
//! caller with [`take_events`](ProxySession::take_events); a terminal
//! event means the caller should drop the session.

use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;
use http::header::{
    ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING,
};
use http::uri::{PathAndQuery, Scheme};
use http::{HeaderMap, HeaderName, HeaderValue, Uri};

use crate::buffer::BodyBuffer;
use crate::client::{ClientRequestSession, RequestData, ResponseData, Rid};
use crate::config::ProxyConfig;
use crate::constants::{
    GRIP_INSTRUCT_CONTENT_TYPE, GRIP_SIG_HEADER, MAX_ACCEPT_REQUEST_BODY,
    MAX_ACCEPT_RESPONSE_BODY, MAX_INITIAL_BUFFER, MAX_STREAM_BUFFER,
};
use crate::error::GatewayError;
use crate::handoff::{AcceptHandoff, ResumptionRecord};
use crate::routing::{DomainMap, Target};
use crate::token::{make_token, validate_token};
use crate::upstream::{ErrorCondition, HttpClientManager, UpstreamRequest};
use crate::xff::XffPolicy;

const HEADER_KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
const HEADER_GRIP_SIG: HeaderName = HeaderName::from_static(GRIP_SIG_HEADER);
const HEADER_X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const HEADER_X_FORWARDED_PROTOCOL: HeaderName = HeaderName::from_static("x-forwarded-protocol");

/// Top-level session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Requesting,
    Accepting,
    Responding,
}

/// Per-client sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    WaitingForResponse,
    Responding,
    Responded,
    Errored,
    Pausing,
    Paused,
}

/// Outbound notification from the session, drained via
/// [`ProxySession::take_events`].
#[derive(Debug)]
pub enum SessionEvent {
    /// No further clients may be attached. Emitted at most once.
    AddNotAllowed,
    /// A client entry was finalized and its request-session released.
    RequestSessionDestroyed(Rid),
    /// Terminal: the response was forwarded and every client finished.
    FinishedByPassthrough,
    /// Terminal: the exchange is handed off for accept.
    FinishedForAccept(AcceptHandoff),
}

struct ClientEntry {
    rid: Rid,
    session: Box<dyn ClientRequestSession>,
    state: ClientState,
    /// Outstanding response bytes owed to this client; -1 means no more
    /// writes will be attempted.
    bytes_to_write: i64,
}

/// State machine for one logical proxied exchange.
pub struct ProxySession {
    state: State,
    manager: Rc<dyn HttpClientManager>,
    domain_map: Rc<dyn DomainMap>,
    entries: Vec<ClientEntry>,
    targets: Vec<Target>,
    upstream: Option<Box<dyn UpstreamRequest>>,
    /// Which client's request stream feeds the upstream body, if any.
    in_request: Option<Rid>,
    is_https: bool,
    channel_prefix: String,
    accept_types: Vec<String>,
    request: RequestData,
    response: ResponseData,
    request_body: BodyBuffer,
    response_body: BodyBuffer,
    /// Body snapshot captured at first add, replayed on retry.
    initial_request_body: Bytes,
    request_bytes_to_write: i64,
    total: u64,
    buffering: bool,
    add_allowed: bool,
    default_sig_iss: String,
    default_sig_key: String,
    default_upstream_key: String,
    pass_to_upstream: bool,
    use_x_forwarded_protocol: bool,
    xff_rule: XffPolicy,
    xff_trusted_rule: XffPolicy,
    inspect: Option<serde_json::Value>,
    events: VecDeque<SessionEvent>,
}

impl ProxySession {
    pub fn new(manager: Rc<dyn HttpClientManager>, domain_map: Rc<dyn DomainMap>) -> Self {
        Self {
            state: State::Stopped,
            manager,
            domain_map,
            entries: Vec::new(),
            targets: Vec::new(),
            upstream: None,
            in_request: None,
            is_https: false,
            channel_prefix: String::new(),
            accept_types: vec![GRIP_INSTRUCT_CONTENT_TYPE.to_string()],
            request: RequestData::default(),
            response: ResponseData::default(),
            request_body: BodyBuffer::new(),
            response_body: BodyBuffer::new(),
            initial_request_body: Bytes::new(),
            request_bytes_to_write: 0,
            total: 0,
            buffering: false,
            add_allowed: true,
            default_sig_iss: String::new(),
            default_sig_key: String::new(),
            default_upstream_key: String::new(),
            pass_to_upstream: false,
            use_x_forwarded_protocol: false,
            xff_rule: XffPolicy::default(),
            xff_trusted_rule: XffPolicy::default(),
            inspect: None,
            events: VecDeque::new(),
        }
    }

    /// Apply the whole configuration surface at once.
    pub fn configure(&mut self, config: &ProxyConfig) {
        self.set_default_sig_key(&config.sig_iss, &config.sig_key);
        self.set_default_upstream_key(&config.upstream_key);
        self.set_use_x_forwarded_protocol(config.use_x_forwarded_protocol);
        self.set_xff_rules(
            config.xff_untrusted.to_policy(),
            config.xff_trusted.to_policy(),
        );
    }

    /// Default signing parameters, used when a route carries none.
    pub fn set_default_sig_key(&mut self, iss: &str, key: &str) {
        self.default_sig_iss = iss.to_string();
        self.default_sig_key = key.to_string();
    }

    /// Key for recognizing requests from a trusted upstream proxy.
    pub fn set_default_upstream_key(&mut self, key: &str) {
        self.default_upstream_key = key.to_string();
    }

    pub fn set_use_x_forwarded_protocol(&mut self, enabled: bool) {
        self.use_x_forwarded_protocol = enabled;
    }

    pub fn set_xff_rules(&mut self, untrusted: XffPolicy, trusted: XffPolicy) {
        self.xff_rule = untrusted;
        self.xff_trusted_rule = trusted;
    }

    /// Store an opaque inspection payload, carried through to the
    /// handoff.
    pub fn set_inspect_data(&mut self, inspect: serde_json::Value) {
        self.inspect = Some(inspect);
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Whether new clients may still be attached.
    pub fn add_allowed(&self) -> bool {
        self.add_allowed
    }

    /// Whether bodies are still being retained for replay/fast-forward.
    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// Cumulative bytes received from upstream.
    pub fn total_received(&self) -> u64 {
        self.total
    }

    /// Drain queued outbound events, in emission order.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Attach a client request-session.
    ///
    /// The first add resolves the route, rewrites headers, and issues
    /// the upstream request. Adds during Requesting wait for the
    /// response; adds during Responding are fast-forwarded to the
    /// buffered prefix. Callers must not add after observing
    /// [`SessionEvent::AddNotAllowed`], and never during Accepting.
    pub fn add(&mut self, session: Box<dyn ClientRequestSession>) {
        debug_assert!(self.add_allowed);
        debug_assert_ne!(self.state, State::Accepting);

        let rid = session.rid();
        self.entries.push(ClientEntry {
            rid,
            session,
            state: ClientState::WaitingForResponse,
            bytes_to_write: 0,
        });
        let idx = self.entries.len() - 1;

        match self.state {
            State::Stopped => self.start(idx),
            State::Requesting => {
                // nothing to do, the new client waits for the response
            }
            State::Responding => {
                // catch the new client up to the in-progress response
                let body = if self.response_body.is_empty() {
                    None
                } else {
                    Some(self.response_body.snapshot())
                };

                let entry = &mut self.entries[idx];
                entry.state = ClientState::Responding;
                entry.session.start_response(
                    self.response.code,
                    &self.response.reason,
                    &self.response.headers,
                );

                if let Some(body) = body {
                    entry.bytes_to_write += body.len() as i64;
                    entry.session.write_response_body(body);
                }
            }
            State::Accepting => {
                // forbidden by external contract; asserted above
            }
        }
    }

    /// External signal that a handoff cannot be carried out. Responds to
    /// every attached client with a cannot-accept error page.
    pub fn cannot_accept(&mut self) {
        for entry in &mut self.entries {
            if entry.state != ClientState::Errored {
                debug_assert_eq!(entry.state, ClientState::WaitingForResponse);

                entry.state = ClientState::Responded;
                entry.bytes_to_write = -1;
                entry.session.respond_cannot_accept();
            }
        }
    }

    /// First-add path: adopt the request, resolve the route, rewrite
    /// headers, and issue the upstream request.
    fn start(&mut self, idx: usize) {
        let mut request = self.entries[idx].session.request_data();
        let host = request.uri.host().unwrap_or_default().to_string();
        self.is_https = self.entries[idx].session.is_https();

        let body = std::mem::take(&mut request.body);
        self.request_body.append(body);

        // these headers only apply to the incoming hop; the upstream
        // hop negotiates its own
        strip_request_headers(&mut request.headers);

        let path = request.uri.path().to_string();
        let Some(route) = self.domain_map.entry(&host, &path, self.is_https) else {
            tracing::warn!(host = %host, "no route for host");
            self.request = request;
            self.reject_all(GatewayError::RoutingMiss { host });
            return;
        };

        let (sig_iss, sig_key) = if !route.sig_iss.is_empty() && !route.sig_key.is_empty() {
            (route.sig_iss, route.sig_key)
        } else {
            (self.default_sig_iss.clone(), self.default_sig_key.clone())
        };

        self.channel_prefix = route.prefix;
        self.targets = route.targets;

        tracing::debug!(host = %host, routes = self.targets.len(), "resolved route");

        // check if the request is coming from a grip proxy already
        if !self.default_upstream_key.is_empty() {
            if let Some(token) = request
                .headers
                .get(HEADER_GRIP_SIG)
                .and_then(|v| v.to_str().ok())
            {
                if validate_token(token, self.default_upstream_key.as_bytes()) {
                    tracing::debug!("passing to upstream");
                    self.pass_to_upstream = true;
                } else {
                    tracing::debug!(token = %token, "signature present but invalid");
                }
            }
        }

        if !self.pass_to_upstream {
            // remove/replace the push signature
            request.headers.remove(HEADER_GRIP_SIG);
            if !sig_iss.is_empty() && !sig_key.is_empty() {
                let value = make_token(&sig_iss, sig_key.as_bytes())
                    .and_then(|t| HeaderValue::from_str(&t).ok());
                match value {
                    Some(value) => {
                        request.headers.insert(HEADER_GRIP_SIG, value);
                    }
                    None => tracing::warn!("failed to sign request"),
                }
            }
        }

        if self.use_x_forwarded_protocol {
            request.headers.remove(HEADER_X_FORWARDED_PROTOCOL);
            if self.is_https {
                request
                    .headers
                    .insert(HEADER_X_FORWARDED_PROTOCOL, HeaderValue::from_static("https"));
            }
        }

        let rule = if self.pass_to_upstream {
            self.xff_trusted_rule
        } else {
            self.xff_rule
        };
        let chain: Vec<String> = request
            .headers
            .get_all(HEADER_X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        request.headers.remove(HEADER_X_FORWARDED_FOR);
        let peer = self.entries[idx].session.peer_address().map(|a| a.to_string());
        let chain = rule.apply(chain, peer.as_deref());
        if !chain.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&chain.join(", ")) {
                request.headers.insert(HEADER_X_FORWARDED_FOR, value);
            }
        }

        self.request = request;
        self.state = State::Requesting;
        self.buffering = true;

        if !self.entries[idx].session.is_retry() {
            self.in_request = Some(self.entries[idx].rid.clone());
            let buf = self.entries[idx].session.read_body();
            self.request_body.append(buf);
        }

        self.initial_request_body = self.request_body.snapshot();

        if self.request_body.len() > MAX_ACCEPT_REQUEST_BODY {
            self.request_body.clear();
            self.buffering = false;
        }

        self.try_next_target();
    }

    fn try_next_target(&mut self) {
        if self.targets.is_empty() {
            self.reject_all(GatewayError::UpstreamFailed);
            return;
        }
        let target = self.targets.remove(0);

        let uri = uri_with_scheme(&self.request.uri, target.ssl);

        tracing::debug!(host = %target.host, port = target.port, "forwarding to target");

        let mut upstream = self.manager.create_request();

        if target.trusted {
            upstream.set_ignore_policies(true);
        }
        if target.insecure {
            upstream.set_ignore_tls_errors(true);
        }

        upstream.set_connect_host(&target.host);
        upstream.set_connect_port(target.port);

        upstream.start(&self.request.method, &uri, &self.request.headers);

        if !self.initial_request_body.is_empty() {
            self.request_bytes_to_write += self.initial_request_body.len() as i64;
            upstream.write_body(self.initial_request_body.clone());
        }

        let input_finished = match &self.in_request {
            Some(rid) => self
                .entry_index(rid)
                .map(|i| self.entries[i].session.is_input_finished())
                .unwrap_or(true),
            None => true,
        };
        if input_finished {
            upstream.end_body();
        }

        self.upstream = Some(upstream);
    }

    /// The primary client's request stream has more body available.
    pub fn request_ready_read(&mut self) {
        self.try_request_read();

        let Some(rid) = self.in_request.clone() else {
            return;
        };
        let Some(idx) = self.entry_index(&rid) else {
            return;
        };
        if self.entries[idx].session.is_input_finished() {
            if let Some(upstream) = self.upstream.as_mut() {
                upstream.end_body();
            }
        }
    }

    /// The primary client's request stream failed.
    pub fn request_error(&mut self) {
        tracing::warn!("error reading primary shared request");

        self.reject_all(GatewayError::RequestStreamFailed);
    }

    fn try_request_read(&mut self) {
        let Some(rid) = self.in_request.clone() else {
            return;
        };
        let Some(idx) = self.entry_index(&rid) else {
            return;
        };
        if self.upstream.is_none() {
            return;
        }

        let buf = self.entries[idx].session.read_body();
        if buf.is_empty() {
            return;
        }

        tracing::debug!(size = buf.len(), "input chunk");

        if self.buffering {
            if self.request_body.len() + buf.len() > MAX_ACCEPT_REQUEST_BODY {
                self.request_body.clear();
                self.buffering = false;
                if self.state == State::Responding && self.add_allowed {
                    self.add_allowed = false;
                    self.events.push_back(SessionEvent::AddNotAllowed);
                }
            } else {
                self.request_body.append(buf.clone());
            }
        }

        self.request_bytes_to_write += buf.len() as i64;
        if let Some(upstream) = self.upstream.as_mut() {
            upstream.write_body(buf);
        }
    }

    /// The upstream handle has response data available. The first call
    /// carries the response headers and drives the transition out of
    /// Requesting.
    pub fn upstream_ready_read(&mut self) {
        tracing::debug!("data from target");

        if self.state != State::Requesting {
            debug_assert!(self.state == State::Accepting || self.state == State::Responding);
            self.try_response_read();
            return;
        }

        let Some(upstream) = self.upstream.as_mut() else {
            return;
        };
        let code = upstream.response_code();
        let reason = upstream.response_reason();
        let headers = upstream.response_headers();
        let chunk = upstream.read_body(MAX_INITIAL_BUFFER);

        self.response.code = code;
        self.response.reason = reason;
        self.response.headers = headers;
        self.response_body.append(chunk);

        self.total += self.response_body.len() as u64;
        tracing::debug!(total = self.total, "response headers from target");

        let content_type = effective_content_type(&self.response.headers);

        if !self.pass_to_upstream && self.accept_types.iter().any(|t| *t == content_type) {
            if !self.buffering {
                // request was too large to replay; the handoff can never
                // be assembled
                self.reject_all(GatewayError::AcceptRequestTooLarge);
                return;
            }

            self.state = State::Accepting;
        } else {
            self.state = State::Responding;

            // these headers only apply to the upstream hop; each client
            // connection frames its own response
            strip_response_headers(&mut self.response.headers);

            if !self.response.headers.contains_key(CONTENT_LENGTH)
                && !self.response.headers.contains_key(TRANSFER_ENCODING)
            {
                self.response
                    .headers
                    .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }

            let body = if self.response_body.is_empty() {
                None
            } else {
                Some(self.response_body.snapshot())
            };
            for entry in &mut self.entries {
                entry.state = ClientState::Responding;
                entry.session.start_response(
                    self.response.code,
                    &self.response.reason,
                    &self.response.headers,
                );

                if let Some(body) = &body {
                    entry.bytes_to_write += body.len() as i64;
                    entry.session.write_response_body(body.clone());
                }
            }

            // with buffering already broken, late adds cannot be
            // fast-forwarded; cut them off now
            if !self.buffering && self.add_allowed {
                self.add_allowed = false;
                self.events.push_back(SessionEvent::AddNotAllowed);
            }
        }

        self.check_incoming_response_finished();
    }

    /// The upstream transport acknowledged writing `count` request-body
    /// bytes.
    pub fn upstream_bytes_written(&mut self, count: usize) {
        self.request_bytes_to_write -= count as i64;
        debug_assert!(self.request_bytes_to_write >= 0);

        if self.request_bytes_to_write == 0 {
            self.try_request_read();
        }
    }

    /// The upstream transport reported an error.
    pub fn upstream_error(&mut self) {
        let condition = self
            .upstream
            .as_ref()
            .map(|u| u.error_condition())
            .unwrap_or(ErrorCondition::Other);
        tracing::debug!(state = ?self.state, condition = ?condition, "target error");

        if self.state == State::Requesting || self.state == State::Accepting {
            match condition {
                ErrorCondition::LengthRequired => {
                    self.reject_all(GatewayError::LengthRequired);
                }
                c if c.is_retryable() => {
                    // connect-stage failures cannot happen once a
                    // response is in flight
                    debug_assert_eq!(self.state, State::Requesting);
                    self.upstream = None;
                    self.try_next_target();
                }
                _ => {
                    self.reject_all(GatewayError::UpstreamFailed);
                }
            }
        } else if self.state == State::Responding {
            // headers are already flushed, an error page is impossible
            self.destroy_all();
        }
    }

    /// A client acknowledged writing `count` response bytes.
    pub fn client_bytes_written(&mut self, rid: &Rid, count: usize) {
        tracing::debug!(id = %rid.id, count, "response bytes written");

        let Some(idx) = self.entry_index(rid) else {
            debug_assert!(false, "bytes written for unknown client");
            return;
        };

        let entry = &mut self.entries[idx];
        if entry.bytes_to_write != -1 {
            entry.bytes_to_write -= count as i64;
            debug_assert!(entry.bytes_to_write >= 0);
        }

        // everyone caught up? try to read some more then
        if !self.buffering && self.upstream.is_some() && !self.pending_writes() {
            self.try_response_read();
        }
    }

    /// A client request-session finished; finalize and release it.
    pub fn client_finished(&mut self, rid: &Rid) {
        tracing::debug!(id = %rid.id, "response finished");

        let Some(idx) = self.entry_index(rid) else {
            debug_assert!(false, "finished for unknown client");
            return;
        };

        self.events
            .push_back(SessionEvent::RequestSessionDestroyed(rid.clone()));

        self.entries.remove(idx);

        if self.in_request.as_ref() == Some(rid) {
            self.in_request = None;
        }

        if self.entries.is_empty() {
            tracing::debug!("finished by passthrough");
            self.events.push_back(SessionEvent::FinishedByPassthrough);
        }
    }

    /// A client confirmed it is paused. When every client is paused the
    /// handoff is assembled and the session ends.
    pub fn client_paused(&mut self, rid: &Rid) {
        tracing::debug!(id = %rid.id, "response paused");

        let Some(idx) = self.entry_index(rid) else {
            debug_assert!(false, "paused for unknown client");
            return;
        };

        debug_assert_eq!(self.entries[idx].state, ClientState::Pausing);
        self.entries[idx].state = ClientState::Paused;

        if !self.entries.iter().all(|e| e.state == ClientState::Paused) {
            return;
        }

        let requests = self
            .entries
            .iter()
            .map(|entry| {
                let state = entry.session.server_state();
                ResumptionRecord {
                    rid: entry.rid.clone(),
                    https: entry.session.is_https(),
                    peer_address: entry.session.peer_address(),
                    auto_cross_origin: entry.session.auto_cross_origin(),
                    jsonp_callback: entry.session.jsonp_callback(),
                    in_seq: state.in_seq,
                    out_seq: state.out_seq,
                    out_credits: state.out_credits,
                    user_data: state.user_data,
                }
            })
            .collect();

        let mut request = self.request.clone();
        request.body = self.request_body.take();

        let mut response = self.response.clone();
        response.body = self.response_body.take();

        let handoff = AcceptHandoff {
            requests,
            request,
            have_response: true,
            response,
            channel_prefix: self.channel_prefix.clone(),
            inspect: self.inspect.clone(),
        };

        tracing::debug!("finished for accept");
        self.entries.clear();
        self.in_request = None;
        self.events.push_back(SessionEvent::FinishedForAccept(handoff));
    }

    /// A client's downstream write failed. The client is excluded from
    /// further writes; its finished event follows separately.
    pub fn client_error_responding(&mut self, rid: &Rid) {
        tracing::debug!(id = %rid.id, "client error while responding");

        let Some(idx) = self.entry_index(rid) else {
            debug_assert!(false, "error for unknown client");
            return;
        };

        let entry = &mut self.entries[idx];
        debug_assert_ne!(entry.state, ClientState::Errored);

        entry.state = ClientState::Errored;
        entry.bytes_to_write = -1;
    }

    fn entry_index(&self, rid: &Rid) -> Option<usize> {
        self.entries.iter().position(|e| e.rid == *rid)
    }

    fn pending_writes(&self) -> bool {
        self.entries.iter().any(|e| e.bytes_to_write > 0)
    }

    fn reject_all(&mut self, error: GatewayError) {
        let code = error.to_http_status();
        let reason = error.reason();
        let message = error.message();

        for entry in &mut self.entries {
            if entry.state != ClientState::Errored {
                debug_assert_eq!(entry.state, ClientState::WaitingForResponse);

                entry.state = ClientState::Responded;
                entry.bytes_to_write = -1;
                entry.session.respond_error(code, reason, &message);
            }
        }
    }

    /// End every responding client's body early. Only valid once
    /// headers have been flushed.
    fn destroy_all(&mut self) {
        debug_assert_eq!(self.state, State::Responding);

        for entry in &mut self.entries {
            debug_assert_ne!(entry.state, ClientState::WaitingForResponse);

            if entry.state == ClientState::Responding {
                entry.state = ClientState::Responded;
                entry.bytes_to_write = -1;
                entry.session.end_response_body();
            }
        }
    }

    fn try_response_read(&mut self) {
        // when not buffering, sync to the slowest client before reading
        // more
        if !self.buffering && self.pending_writes() {
            return;
        }

        let Some(upstream) = self.upstream.as_mut() else {
            return;
        };
        let buf = upstream.read_body(MAX_STREAM_BUFFER);

        if !buf.is_empty() {
            self.total += buf.len() as u64;
            tracing::debug!(recv = buf.len(), total = self.total, "received from target");

            if self.state == State::Accepting {
                if self.response_body.len() + buf.len() > MAX_ACCEPT_RESPONSE_BODY {
                    self.reject_all(GatewayError::AcceptResponseTooLarge);
                    return;
                }

                self.response_body.append(buf);
            } else {
                let was_allowed = self.add_allowed;

                if self.buffering {
                    if self.response_body.len() + buf.len() > MAX_INITIAL_BUFFER {
                        self.response_body.clear();
                        self.buffering = false;
                        self.add_allowed = false;
                    } else {
                        self.response_body.append(buf.clone());
                    }
                }

                tracing::debug!(size = buf.len(), "writing to clients");

                for entry in &mut self.entries {
                    debug_assert_ne!(entry.state, ClientState::WaitingForResponse);

                    if entry.state == ClientState::Responding {
                        entry.bytes_to_write += buf.len() as i64;
                        entry.session.write_response_body(buf.clone());
                    }
                }

                if was_allowed && !self.add_allowed {
                    self.events.push_back(SessionEvent::AddNotAllowed);
                }
            }
        }

        self.check_incoming_response_finished();
    }

    fn check_incoming_response_finished(&mut self) {
        let finished = self.upstream.as_ref().is_some_and(|u| u.is_finished());
        if !finished {
            return;
        }

        tracing::debug!("response from target finished");

        if !self.buffering && self.pending_writes() {
            tracing::debug!("waiting for clients to drain before finishing");
            return;
        }

        self.upstream = None;

        if self.state == State::Accepting {
            for entry in &mut self.entries {
                entry.state = ClientState::Pausing;
                entry.session.pause();
            }
        } else {
            for entry in &mut self.entries {
                debug_assert_ne!(entry.state, ClientState::WaitingForResponse);

                if entry.state == ClientState::Responding {
                    entry.state = ClientState::Responded;
                    entry.session.end_response_body();
                }
            }

            // the entire response has been received, cut off any new
            // adds
            if self.add_allowed {
                self.add_allowed = false;
                self.events.push_back(SessionEvent::AddNotAllowed);
            }
        }
    }
}

fn strip_request_headers(headers: &mut HeaderMap) {
    headers.remove(CONNECTION);
    headers.remove(HEADER_KEEP_ALIVE);
    headers.remove(ACCEPT_ENCODING);
    headers.remove(CONTENT_ENCODING);
    headers.remove(TRANSFER_ENCODING);
}

fn strip_response_headers(headers: &mut HeaderMap) {
    headers.remove(CONNECTION);
    headers.remove(HEADER_KEEP_ALIVE);
    headers.remove(CONTENT_ENCODING);
    headers.remove(TRANSFER_ENCODING);
}

/// Content type with any `;`-delimited parameters stripped.
fn effective_content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(';').next())
        .unwrap_or_default()
        .to_string()
}

/// The request URI with its scheme set per the target's SSL flag.
fn uri_with_scheme(uri: &Uri, ssl: bool) -> Uri {
    let mut parts = uri.clone().into_parts();
    if parts.authority.is_none() {
        return uri.clone();
    }
    parts.scheme = Some(if ssl { Scheme::HTTPS } else { Scheme::HTTP });
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}
