//! Append-only body buffer.
//!
//! Accumulates body chunks without copying until a contiguous view is
//! needed. Only the total size and exact byte sequence are observable;
//! chunk boundaries are internal.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

/// Chunked byte buffer with non-destructive and destructive read-out.
#[derive(Debug, Default)]
pub struct BodyBuffer {
    chunks: VecDeque<Bytes>,
    size: usize,
}

impl BodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn append(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.size += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Total buffered bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Contiguous copy of the buffered bytes, leaving the buffer intact.
    pub fn snapshot(&self) -> Bytes {
        if self.chunks.len() == 1 {
            return self.chunks[0].clone();
        }
        let mut out = BytesMut::with_capacity(self.size);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out.freeze()
    }

    /// Drain the buffer, returning its contents contiguously.
    pub fn take(&mut self) -> Bytes {
        let out = self.snapshot();
        self.clear();
        out
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.size = 0;
    }
}
