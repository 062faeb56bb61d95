//! Bounded in-memory nullifier set, the read cache in front of the
//! durable store.

use murmur_types::{ExternalNullifier, NullifierHash};
use std::collections::{HashSet, VecDeque};

const MAX_NULLIFIERS: usize = 1_000_000;

#[derive(Clone, Hash, PartialEq, Eq)]
struct ScopedNullifier {
    nullifier: NullifierHash,
    scope: ExternalNullifier,
}

pub struct BoundedNullifierSet {
    set: HashSet<ScopedNullifier>,
    order: VecDeque<ScopedNullifier>,
    evicted: u64,
}

impl BoundedNullifierSet {
    pub fn new() -> Self {
        Self {
            set: HashSet::with_capacity(1024),
            order: VecDeque::with_capacity(1024),
            evicted: 0,
        }
    }

    pub fn contains(&self, nullifier: &NullifierHash, scope: &ExternalNullifier) -> bool {
        self.set.contains(&ScopedNullifier {
            nullifier: *nullifier,
            scope: *scope,
        })
    }

    pub fn insert(&mut self, nullifier: NullifierHash, scope: ExternalNullifier) -> bool {
        let key = ScopedNullifier { nullifier, scope };

        if self.set.contains(&key) {
            return false;
        }

        while self.set.len() >= MAX_NULLIFIERS {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
                self.evicted += 1;
            }
        }

        self.set.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

impl Default for BoundedNullifierSet {
    fn default() -> Self {
        Self::new()
    }
}
