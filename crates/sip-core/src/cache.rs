//! Bounded memoization for the parser.
//!
//! SIP endpoints retransmit aggressively (INVITE retries, Via-identical
//! OPTIONS pings), so the same byte string tends to arrive many times in
//! a row. Parsing is pure, which makes the raw message a perfect cache
//! key. Each worker owns its own cache; there is no cross-worker sharing.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::datagram::SipDatagram;
use crate::error::Result;
use crate::parser;

/// Minimum number of retained entries.
pub const MIN_CAPACITY: usize = 128;

/// An LRU-bounded cache over [`parser::parse`].
#[derive(Debug)]
pub struct ParseCache {
    entries: LruCache<String, SipDatagram>,
}

impl ParseCache {
    /// Create a cache retaining at least [`MIN_CAPACITY`] entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).expect("capacity is non-zero")),
        }
    }

    /// Parse through the cache. Only successful parses are retained;
    /// malformed messages are re-reported on every arrival.
    pub fn parse(&mut self, message: &str) -> Result<SipDatagram> {
        if let Some(datagram) = self.entries.get(message) {
            return Ok(datagram.clone());
        }
        let datagram = parser::parse(message)?;
        self.entries.put(message.to_string(), datagram.clone());
        Ok(datagram)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(MIN_CAPACITY)
    }
}
