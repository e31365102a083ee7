//! Identity and heap cache.
//!
//! Identity labels and the heap ceiling are fixed for the lifetime of a JVM,
//! so they are resolved once per pid and reused across cycles. Entries are
//! pruned to the live pid set at the start of every cycle, which also keeps a
//! reused pid from inheriting the labels of an exited JVM.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::sync::{PoisonError, RwLock};

use crate::extract::{HeapAttributes, IdentityAttributes};

/// Cached attributes for one pid. Each kind is stored once resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedAttributes {
    pub identity: Option<IdentityAttributes>,
    pub heap: Option<HeapAttributes>,
}

/// Per-pid memo of identity and heap attributes.
///
/// Concurrent reads are shared; writes take the lock exclusively. A poisoned
/// lock is recovered rather than propagated since every entry is replaceable.
#[derive(Debug, Default)]
pub struct AttributeCache {
    entries: RwLock<HashMap<u32, CachedAttributes>>,
}

impl AttributeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both attributes of `pid`, if both have been resolved.
    pub fn get(&self, pid: u32) -> Option<(IdentityAttributes, HeapAttributes)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(&pid)?;
        Some((entry.identity.clone()?, entry.heap?))
    }

    pub fn put(&self, pid: u32, identity: IdentityAttributes, heap: HeapAttributes) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            pid,
            CachedAttributes {
                identity: Some(identity),
                heap: Some(heap),
            },
        );
    }

    pub fn identity(&self, pid: u32) -> Option<IdentityAttributes> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&pid).and_then(|e| e.identity.clone())
    }

    pub fn heap(&self, pid: u32) -> Option<HeapAttributes> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&pid).and_then(|e| e.heap)
    }

    pub fn put_identity(&self, pid: u32, identity: IdentityAttributes) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(pid).or_default().identity = Some(identity);
    }

    pub fn put_heap(&self, pid: u32, heap: HeapAttributes) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(pid).or_default().heap = Some(heap);
    }

    /// Drops every entry whose pid is not in `live`; returns how many went.
    pub fn prune(&self, live: &HashSet<u32>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|pid, _| live.contains(pid));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(app: &str) -> IdentityAttributes {
        IdentityAttributes {
            app_name: app.into(),
            variant: format!("{app}-v1"),
        }
    }

    #[test]
    fn test_get_requires_both_kinds() {
        let cache = AttributeCache::new();
        assert!(cache.get(1).is_none());

        cache.put_identity(1, identity("billing"));
        assert!(cache.get(1).is_none());
        assert_eq!(cache.identity(1), Some(identity("billing")));

        cache.put_heap(1, HeapAttributes { max_heap_bytes: 42 });
        assert_eq!(
            cache.get(1),
            Some((identity("billing"), HeapAttributes { max_heap_bytes: 42 }))
        );
    }

    #[test]
    fn test_prune_keeps_only_live() {
        let cache = AttributeCache::new();
        cache.put(1, identity("a"), HeapAttributes::default());
        cache.put(2, identity("b"), HeapAttributes::default());
        cache.put(3, identity("c"), HeapAttributes::default());

        let live: HashSet<u32> = [2].into_iter().collect();
        assert_eq!(cache.prune(&live), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());

        assert_eq!(cache.prune(&HashSet::new()), 1);
        assert!(cache.is_empty());
    }
}
