//! Forwarded-chain rewrite rules.
//!
//! An [`XffPolicy`] describes how the `X-Forwarded-For` chain is rewritten
//! before a request goes upstream: optionally truncating the chain from
//! the front and optionally appending the connecting peer's address.
//! Separate policies are configured for trusted and untrusted sources;
//! the session picks which one applies.
//!
//! Chain entries are individual header values. Truncation keeps the
//! *last* `truncate` entries, so the addresses closest to this hop
//! survive.

/// Truncate+append rule for the forwarded chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XffPolicy {
    /// Maximum entries to keep from the existing chain; -1 means keep all.
    pub truncate: i64,
    /// Whether to append the connecting peer's address.
    pub append: bool,
}

impl Default for XffPolicy {
    fn default() -> Self {
        Self {
            truncate: -1,
            append: false,
        }
    }
}

impl XffPolicy {
    pub fn new(truncate: i64, append: bool) -> Self {
        Self { truncate, append }
    }

    /// Rewrite a forwarded chain, returning the new entry list.
    ///
    /// The caller joins a non-empty result with ", " into a single header
    /// value and omits the header entirely when the result is empty.
    pub fn apply(&self, mut chain: Vec<String>, peer: Option<&str>) -> Vec<String> {
        if self.truncate >= 0 {
            let keep = self.truncate as usize;
            if chain.len() > keep {
                let drop = chain.len() - keep;
                chain.drain(..drop);
            }
        }

        if self.append {
            if let Some(peer) = peer {
                chain.push(peer.to_string());
            }
        }

        chain
    }
}
