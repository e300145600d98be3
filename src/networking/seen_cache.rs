// Copyright (c) 2026 the lanpeerdiscoveryd authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Bounded `(peer_id, nonce) -> expiry` deduplication cache, the only
//! concurrently-mutable structure in this crate. The listener (read + write)
//! and the cleanup task (write) share it through an internal mutex; its
//! public interface is three pure operations and nothing else (no callbacks).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Thread-safe, time-bounded replay cache.
pub struct SeenCache {
    entries: Mutex<HashMap<(String, Vec<u8>), Instant>>,
}

impl SeenCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// True iff `(id, nonce)` is currently present and unexpired.
    pub fn seen(&self, id: &str, nonce: &[u8], now: Instant) -> bool {
        let guard = self.entries.lock().expect("seen-cache mutex poisoned");
        match guard.get(&(id.to_string(), nonce.to_vec())) {
            Some(expiry) => *expiry > now,
            None => false,
        }
    }

    /// Insert or overwrite the expiry for `(id, nonce)`. No-op if `expiry <= now`.
    pub fn add(&self, id: &str, nonce: &[u8], now: Instant, expiry: Instant) {
        if expiry <= now {
            return;
        }
        let mut guard = self.entries.lock().expect("seen-cache mutex poisoned");
        guard.insert((id.to_string(), nonce.to_vec()), expiry);
    }

    /// Remove every entry whose expiry has passed.
    pub fn cleanup(&self, now: Instant) -> usize {
        let mut guard = self.entries.lock().expect("seen-cache mutex poisoned");
        let before = guard.len();
        guard.retain(|_, expiry| *expiry > now);
        before - guard.len()
    }

    /// Current number of tracked entries (used for the `seen_cache_size` gauge).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("seen-cache mutex poisoned").len()
    }

    /// True if the cache currently tracks no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SeenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_entry_is_not_seen() {
        let cache = SeenCache::new();
        let now = Instant::now();
        assert!(!cache.seen("peer-a", b"nonce1", now));
    }

    #[test]
    fn added_entry_is_seen_until_expiry() {
        let cache = SeenCache::new();
        let now = Instant::now();
        cache.add("peer-a", b"nonce1", now, now + Duration::from_secs(20));
        assert!(cache.seen("peer-a", b"nonce1", now));
        assert!(cache.seen("peer-a", b"nonce1", now + Duration::from_secs(19)));
        assert!(!cache.seen("peer-a", b"nonce1", now + Duration::from_secs(21)));
    }

    #[test]
    fn add_with_past_expiry_is_a_no_op() {
        let cache = SeenCache::new();
        let now = Instant::now();
        cache.add("peer-a", b"nonce1", now, now - Duration::from_secs(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn cleanup_removes_only_expired_entries() {
        let cache = SeenCache::new();
        let now = Instant::now();
        cache.add("peer-a", b"n1", now, now + Duration::from_secs(10));
        cache.add("peer-b", b"n2", now, now + Duration::from_secs(100));
        let removed = cache.cleanup(now + Duration::from_secs(20));
        assert_eq!(removed, 1);
        assert!(!cache.seen("peer-a", b"n1", now + Duration::from_secs(20)));
        assert!(cache.seen("peer-b", b"n2", now + Duration::from_secs(20)));
    }

    #[test]
    fn distinct_nonces_for_same_peer_are_independent() {
        let cache = SeenCache::new();
        let now = Instant::now();
        cache.add("peer-a", b"n1", now, now + Duration::from_secs(20));
        assert!(!cache.seen("peer-a", b"n2", now));
    }
}
