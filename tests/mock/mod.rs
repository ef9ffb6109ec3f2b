// Shared mock collaborators for session scenario tests.
//
// The session core only ever talks to its collaborators through the
// client/upstream/domain-map traits, so these mocks stand in for the
// real transports: tests push data into the shared state cells and then
// deliver the corresponding events to the session.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};

use torii::client::{ClientRequestSession, RequestData, Rid, ServerState};
use torii::routing::{DomainMap, RouteEntry, Target};
use torii::upstream::{ErrorCondition, HttpClientManager, UpstreamRequest};

// ============================================================================
// Domain map
// ============================================================================

#[derive(Default)]
pub struct StaticDomainMap {
    pub routes: HashMap<String, RouteEntry>,
}

impl StaticDomainMap {
    pub fn empty() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn with_route(host: &str, entry: RouteEntry) -> Rc<Self> {
        let mut map = Self::default();
        map.routes.insert(host.to_string(), entry);
        Rc::new(map)
    }
}

impl DomainMap for StaticDomainMap {
    fn entry(&self, host: &str, _path: &str, _is_https: bool) -> Option<RouteEntry> {
        self.routes.get(host).cloned()
    }
}

/// Route with a single plain-HTTP target and no per-route signing.
pub fn simple_route(host: &str, port: u16) -> RouteEntry {
    RouteEntry {
        prefix: String::new(),
        targets: vec![Target::new(host, port)],
        sig_iss: String::new(),
        sig_key: String::new(),
    }
}

// ============================================================================
// Upstream
// ============================================================================

#[derive(Default)]
pub struct UpstreamState {
    pub started: Option<(Method, Uri, HeaderMap)>,
    pub connect_host: String,
    pub connect_port: u16,
    pub ignore_policies: bool,
    pub ignore_tls_errors: bool,
    pub written: BytesMut,
    pub body_ended: bool,
    pub to_read: VecDeque<Bytes>,
    pub response_code: u16,
    pub response_reason: String,
    pub response_headers: HeaderMap,
    pub finished: bool,
    pub error: Option<ErrorCondition>,
}

impl UpstreamState {
    pub fn written_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.written)
    }

    /// Response bytes queued but not yet read by the session.
    pub fn unread_len(&self) -> usize {
        self.to_read.iter().map(|b| b.len()).sum()
    }
}

pub struct MockUpstream {
    state: Rc<RefCell<UpstreamState>>,
}

impl UpstreamRequest for MockUpstream {
    fn set_ignore_policies(&mut self, on: bool) {
        self.state.borrow_mut().ignore_policies = on;
    }

    fn set_ignore_tls_errors(&mut self, on: bool) {
        self.state.borrow_mut().ignore_tls_errors = on;
    }

    fn set_connect_host(&mut self, host: &str) {
        self.state.borrow_mut().connect_host = host.to_string();
    }

    fn set_connect_port(&mut self, port: u16) {
        self.state.borrow_mut().connect_port = port;
    }

    fn start(&mut self, method: &Method, uri: &Uri, headers: &HeaderMap) {
        self.state.borrow_mut().started = Some((method.clone(), uri.clone(), headers.clone()));
    }

    fn write_body(&mut self, body: Bytes) {
        self.state.borrow_mut().written.extend_from_slice(&body);
    }

    fn end_body(&mut self) {
        self.state.borrow_mut().body_ended = true;
    }

    fn read_body(&mut self, max: usize) -> Bytes {
        let mut state = self.state.borrow_mut();
        let mut out = BytesMut::new();
        while out.len() < max {
            let Some(mut chunk) = state.to_read.pop_front() else {
                break;
            };
            let room = max - out.len();
            if chunk.len() > room {
                out.extend_from_slice(&chunk.split_to(room));
                state.to_read.push_front(chunk);
            } else {
                out.extend_from_slice(&chunk);
            }
        }
        out.freeze()
    }

    fn response_code(&self) -> u16 {
        self.state.borrow().response_code
    }

    fn response_reason(&self) -> String {
        self.state.borrow().response_reason.clone()
    }

    fn response_headers(&self) -> HeaderMap {
        self.state.borrow().response_headers.clone()
    }

    fn is_finished(&self) -> bool {
        let state = self.state.borrow();
        state.finished && state.to_read.is_empty()
    }

    fn error_condition(&self) -> ErrorCondition {
        self.state.borrow().error.unwrap_or(ErrorCondition::Other)
    }
}

#[derive(Default)]
pub struct MockManager {
    created: RefCell<Vec<Rc<RefCell<UpstreamState>>>>,
}

impl MockManager {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn created_count(&self) -> usize {
        self.created.borrow().len()
    }

    pub fn upstream(&self, idx: usize) -> Rc<RefCell<UpstreamState>> {
        self.created.borrow()[idx].clone()
    }
}

impl HttpClientManager for MockManager {
    fn create_request(&self) -> Box<dyn UpstreamRequest> {
        let state = Rc::new(RefCell::new(UpstreamState::default()));
        self.created.borrow_mut().push(state.clone());
        Box::new(MockUpstream { state })
    }
}

/// Stage a response on the upstream: headers plus an optional first body
/// chunk. The test delivers it with `session.upstream_ready_read()`.
pub fn respond(
    upstream: &Rc<RefCell<UpstreamState>>,
    code: u16,
    reason: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    finished: bool,
) {
    let mut state = upstream.borrow_mut();
    state.response_code = code;
    state.response_reason = reason.to_string();
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            name.parse::<HeaderName>().unwrap(),
            value.parse::<HeaderValue>().unwrap(),
        );
    }
    state.response_headers = map;
    if !body.is_empty() {
        state.to_read.push_back(Bytes::copy_from_slice(body));
    }
    state.finished = finished;
}

/// Queue a further body chunk on an already-responding upstream.
pub fn push_body(upstream: &Rc<RefCell<UpstreamState>>, body: &[u8]) {
    upstream
        .borrow_mut()
        .to_read
        .push_back(Bytes::copy_from_slice(body));
}

// ============================================================================
// Client request-session
// ============================================================================

pub struct ClientCell {
    pub rid: Rid,
    pub https: bool,
    pub retry: bool,
    pub request: RequestData,
    pub stream: VecDeque<Bytes>,
    pub input_finished: bool,
    pub peer: Option<IpAddr>,
    pub auto_cross_origin: bool,
    pub jsonp_callback: Option<String>,
    pub server_state: ServerState,
    pub started: Option<(u16, String, HeaderMap)>,
    pub body: BytesMut,
    pub body_ended: bool,
    pub errors: Vec<(u16, String, String)>,
    pub cannot_accept: bool,
    pub pause_requested: bool,
}

impl ClientCell {
    pub fn new(id: &str, method: &str, uri: &str) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            rid: Rid::new("test", id),
            https: false,
            retry: false,
            request: RequestData {
                method: method.parse().unwrap(),
                uri: uri.parse().unwrap(),
                headers: HeaderMap::new(),
                body: Bytes::new(),
            },
            stream: VecDeque::new(),
            input_finished: true,
            peer: Some("10.0.0.1".parse().unwrap()),
            auto_cross_origin: false,
            jsonp_callback: None,
            server_state: ServerState::default(),
            started: None,
            body: BytesMut::new(),
            body_ended: false,
            errors: Vec::new(),
            cannot_accept: false,
            pause_requested: false,
        }))
    }

    pub fn body_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.body)
    }
}

pub struct MockClient {
    state: Rc<RefCell<ClientCell>>,
}

/// Box a client cell for attachment to a session.
pub fn attach(state: &Rc<RefCell<ClientCell>>) -> Box<dyn ClientRequestSession> {
    Box::new(MockClient {
        state: state.clone(),
    })
}

pub fn rid_of(state: &Rc<RefCell<ClientCell>>) -> Rid {
    state.borrow().rid.clone()
}

impl ClientRequestSession for MockClient {
    fn rid(&self) -> Rid {
        self.state.borrow().rid.clone()
    }

    fn request_data(&self) -> RequestData {
        self.state.borrow().request.clone()
    }

    fn is_https(&self) -> bool {
        self.state.borrow().https
    }

    fn is_retry(&self) -> bool {
        self.state.borrow().retry
    }

    fn peer_address(&self) -> Option<IpAddr> {
        self.state.borrow().peer
    }

    fn auto_cross_origin(&self) -> bool {
        self.state.borrow().auto_cross_origin
    }

    fn jsonp_callback(&self) -> Option<String> {
        self.state.borrow().jsonp_callback.clone()
    }

    fn server_state(&self) -> ServerState {
        self.state.borrow().server_state.clone()
    }

    fn read_body(&mut self) -> Bytes {
        let mut state = self.state.borrow_mut();
        let mut out = BytesMut::new();
        while let Some(chunk) = state.stream.pop_front() {
            out.extend_from_slice(&chunk);
        }
        out.freeze()
    }

    fn is_input_finished(&self) -> bool {
        let state = self.state.borrow();
        state.input_finished && state.stream.is_empty()
    }

    fn start_response(&mut self, code: u16, reason: &str, headers: &HeaderMap) {
        self.state.borrow_mut().started = Some((code, reason.to_string(), headers.clone()));
    }

    fn write_response_body(&mut self, body: Bytes) {
        self.state.borrow_mut().body.extend_from_slice(&body);
    }

    fn end_response_body(&mut self) {
        self.state.borrow_mut().body_ended = true;
    }

    fn respond_error(&mut self, code: u16, reason: &str, message: &str) {
        self.state
            .borrow_mut()
            .errors
            .push((code, reason.to_string(), message.to_string()));
    }

    fn respond_cannot_accept(&mut self) {
        self.state.borrow_mut().cannot_accept = true;
    }

    fn pause(&mut self) {
        self.state.borrow_mut().pause_requested = true;
    }
}
