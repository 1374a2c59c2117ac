// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation abstractions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Generates unique identifiers
pub trait IdGen: Clone + Send + Sync + 'static {
    fn next(&self) -> String;

    /// Child id for a job spawned from a bulk: `parentId:random`
    fn child(&self, parent_id: &str) -> String {
        let suffix = self.next();
        let short = suffix.split('-').next().unwrap_or(&suffix);
        format!("{}:{}", parent_id, short)
    }
}

/// UUID-based ID generator for production use
#[derive(Clone, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential ID generator for testing
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }

    fn child(&self, parent_id: &str) -> String {
        format!("{}:{}", parent_id, self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_count_up() {
        let gen = SequentialIdGen::new("job");
        assert_eq!(gen.next(), "job-1");
        assert_eq!(gen.next(), "job-2");
    }

    #[test]
    fn child_ids_encode_parent() {
        let gen = SequentialIdGen::new("j");
        assert_eq!(gen.child("bulk-7"), "bulk-7:j-1");
    }

    #[test]
    fn uuid_ids_are_unique() {
        let gen = UuidIdGen;
        assert_ne!(gen.next(), gen.next());
    }

    #[test]
    fn uuid_child_uses_short_segment() {
        let gen = UuidIdGen;
        let id = gen.child("parent");
        let suffix = id.strip_prefix("parent:").unwrap();
        assert_eq!(suffix.len(), 8);
    }
}
