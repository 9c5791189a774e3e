//! Forest of duplicate→original edges. Each node has at most one parent and
//! any number of children; edges only ever point from a newer identifier to
//! an older one, so the graph is acyclic by construction.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

const MAX_ROOT_DEPTH: usize = 64;

#[derive(Default)]
struct Inner {
    parent: HashMap<i64, i64>,
    children: HashMap<i64, Vec<i64>>,
}

pub struct AttributionGraph {
    inner: Mutex<Inner>,
}

impl Default for AttributionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributionGraph {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Records that `dup_id` is a duplicate of `orig_id`. Never loses an edge
    /// under concurrent insertions of distinct identifiers (guarded by a
    /// single lock covering both maps).
    pub fn add_edge(&self, dup_id: i64, orig_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.parent.insert(dup_id, orig_id);
        inner.children.entry(orig_id).or_default().push(dup_id);
    }

    /// Follows parent edges until none remain. Bounded by a defensive depth
    /// cap so malformed imported state cannot cause an infinite loop.
    pub fn root(&self, id: i64) -> i64 {
        let inner = self.inner.lock().unwrap();
        let mut current = id;
        for _ in 0..MAX_ROOT_DEPTH {
            match inner.parent.get(&current) {
                Some(parent) => current = *parent,
                None => return current,
            }
        }
        current
    }

    /// Iterative DFS over children edges; unspecified order.
    pub fn descendants(&self, id: i64) -> HashSet<i64> {
        let inner = self.inner.lock().unwrap();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if let Some(kids) = inner.children.get(&node) {
                for &kid in kids {
                    if seen.insert(kid) {
                        stack.push(kid);
                    }
                }
            }
        }
        seen
    }

    pub fn parent_of(&self, id: i64) -> Option<i64> {
        self.inner.lock().unwrap().parent.get(&id).copied()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.lock().unwrap().parent.len()
    }
}
