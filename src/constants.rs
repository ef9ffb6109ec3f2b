// Constants module - centralized tuning values for the session core
//
// These are the fixed values of record for buffering bounds and token
// lifetime. Using constants instead of magic numbers makes the limits
// easy to audit and reference from tests.

// =============================================================================
// Buffering bounds
// =============================================================================

/// Maximum request body retained for replay/handoff. Past this, buffering
/// is abandoned for the remainder of the session.
pub const MAX_ACCEPT_REQUEST_BODY: usize = 100_000;

/// Maximum response body accepted while buffering a GRIP instruct.
/// Exceeding this is fatal to the session.
pub const MAX_ACCEPT_RESPONSE_BODY: usize = 100_000;

/// Maximum response prefix retained for fast-forwarding late-attached
/// clients.
pub const MAX_INITIAL_BUFFER: usize = 100_000;

/// Maximum bytes pulled from the upstream handle per read.
pub const MAX_STREAM_BUFFER: usize = 100_000;

// =============================================================================
// Push-protocol signing
// =============================================================================

/// Lifetime of a freshly minted push-signature token, in seconds.
pub const SIG_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Header carrying the push-signature token.
pub const GRIP_SIG_HEADER: &str = "grip-sig";

/// Content type that switches the session into accept mode.
pub const GRIP_INSTRUCT_CONTENT_TYPE: &str = "application/grip-instruct";
