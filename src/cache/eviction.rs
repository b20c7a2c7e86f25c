// src/cache/eviction.rs

//! Eviction of the cache's in-memory index.
//!
//! - **LRU**: keep at most `max_entries`, dropping the least recently used.
//! - **Age**: drop entries older than `max_age`.
//!
//! Eviction never touches the artifact store; an evicted entry is reloaded
//! from the store on its next lookup.

use std::time::{Duration, Instant};

use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    #[default]
    None,
    Lru {
        max_entries: usize,
    },
    Age {
        max_age: Duration,
    },
}

/// What the policy needs to know about one index entry.
#[derive(Debug, Clone, Copy)]
pub struct EvictionCandidate {
    pub fingerprint: Fingerprint,
    /// Monotonic access counter value at the last lookup.
    pub last_access: u64,
    pub inserted_at: Instant,
}

impl EvictionPolicy {
    /// Whether a single entry has outlived the policy.
    pub fn is_expired(&self, inserted_at: Instant, now: Instant) -> bool {
        match self {
            EvictionPolicy::Age { max_age } => now.saturating_duration_since(inserted_at) > *max_age,
            _ => false,
        }
    }

    /// Fingerprints to drop from the index, oldest first.
    pub fn select_victims(
        &self,
        candidates: &mut [EvictionCandidate],
        now: Instant,
    ) -> Vec<Fingerprint> {
        match self {
            EvictionPolicy::None => Vec::new(),
            EvictionPolicy::Lru { max_entries } => {
                if candidates.len() <= *max_entries {
                    return Vec::new();
                }
                candidates.sort_by_key(|c| c.last_access);
                let excess = candidates.len() - max_entries;
                candidates[..excess].iter().map(|c| c.fingerprint).collect()
            }
            EvictionPolicy::Age { .. } => {
                candidates.sort_by_key(|c| c.inserted_at);
                candidates
                    .iter()
                    .filter(|c| self.is_expired(c.inserted_at, now))
                    .map(|c| c.fingerprint)
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(n: u8) -> Fingerprint {
        Fingerprint::from_bytes([n; 32])
    }

    #[test]
    fn lru_drops_least_recently_used() {
        let now = Instant::now();
        let mut candidates = vec![
            EvictionCandidate { fingerprint: fp(1), last_access: 5, inserted_at: now },
            EvictionCandidate { fingerprint: fp(2), last_access: 1, inserted_at: now },
            EvictionCandidate { fingerprint: fp(3), last_access: 9, inserted_at: now },
        ];
        let policy = EvictionPolicy::Lru { max_entries: 2 };
        assert_eq!(policy.select_victims(&mut candidates, now), vec![fp(2)]);

        let policy = EvictionPolicy::Lru { max_entries: 3 };
        assert!(policy.select_victims(&mut candidates, now).is_empty());
    }

    #[test]
    fn age_drops_only_expired_entries() {
        let start = Instant::now();
        let later = start + Duration::from_secs(10);
        let mut candidates = vec![
            EvictionCandidate { fingerprint: fp(1), last_access: 0, inserted_at: start },
            EvictionCandidate { fingerprint: fp(2), last_access: 0, inserted_at: later },
        ];
        let policy = EvictionPolicy::Age { max_age: Duration::from_secs(5) };
        let now = later + Duration::from_secs(1);
        assert_eq!(policy.select_victims(&mut candidates, now), vec![fp(1)]);
        assert!(!EvictionPolicy::None.is_expired(start, now));
    }
}
