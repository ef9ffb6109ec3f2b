//! Route resolution interface.
//!
//! The session core resolves a route exactly once, at the first `add`,
//! by asking the domain map for an entry matching (host, path, https).
//! The entry carries the ordered target list consumed front-to-back on
//! retry, the channel prefix handed off on accept, and optional per-route
//! signing parameters that override the configured defaults.

/// One upstream origin candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Hostname or address to connect to.
    pub host: String,
    /// Port to connect to.
    pub port: u16,
    /// Whether to speak TLS to this target.
    pub ssl: bool,
    /// Authorizes the upstream client to bypass its policy checks.
    pub trusted: bool,
    /// Authorizes the upstream client to ignore TLS validation errors.
    pub insecure: bool,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ssl: false,
            trusted: false,
            insecure: false,
        }
    }
}

/// Resolved route for one logical exchange.
#[derive(Debug, Clone, Default)]
pub struct RouteEntry {
    /// Channel prefix carried through to the accept handoff.
    pub prefix: String,
    /// Ordered origin candidates, consumed front-to-back on retry.
    pub targets: Vec<Target>,
    /// Per-route signing issuer; both iss and key must be set to
    /// override the defaults.
    pub sig_iss: String,
    /// Per-route signing key.
    pub sig_key: String,
}

/// Domain→route map consumed at session start.
pub trait DomainMap {
    /// Look up the route for a request. None means no route exists and
    /// the session must reject.
    fn entry(&self, host: &str, path: &str, is_https: bool) -> Option<RouteEntry>;
}
