//! # lru-cache
//!
//! A single-threaded, fixed-byte-capacity string/string cache with
//! recency-based eviction. The head of the internal list is always the
//! next eviction victim; the tail is always the most recently touched
//! entry.
//!
//! The list and its key index are both arena-indexed by a stable `usize`
//! handle rather than linked through raw pointers, so there is no pointer
//! aliasing to reason about the way the C++ original's `swap`-based
//! relinking requires.
//!
//! All operations run without any internal locking — concurrent use needs
//! an external lock wrapping each call.

use std::collections::HashMap;

struct Node {
    key: String,
    value: String,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A bounded-byte-capacity key/value cache with LRU eviction.
pub struct Cache {
    max_size: usize,
    actual_size: usize,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Cache {
    /// Create an empty cache that may hold at most `max_size` total bytes
    /// of key+value data across all live entries.
    pub fn new(max_size: usize) -> Cache {
        Cache {
            max_size,
            actual_size: 0,
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    /// Total bytes permitted across all live key+value pairs.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Bytes currently occupied: `Σ (key.len() + value.len())`.
    pub fn actual_size(&self) -> usize {
        self.actual_size
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Insert or replace `key`. If `key` already exists, its value is
    /// replaced and it is moved to the tail; otherwise a new entry is
    /// inserted at the tail. Evicts from the head as needed to stay
    /// within `max_size`.
    ///
    /// Fails (returns `false`, leaving the cache unchanged) iff
    /// `key.len() + value.len() > max_size`.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        let value = value.into();
        if key.len() + value.len() > self.max_size {
            return false;
        }
        if let Some(&handle) = self.index.get(key.as_str()) {
            self.replace_and_touch(handle, value);
        } else {
            self.insert_new(key, value);
        }
        true
    }

    /// Insert `key` only if absent. Returns `false` without touching
    /// anything if `key` already exists.
    pub fn put_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.index.contains_key(&key) {
            return false;
        }
        let value = value.into();
        if key.len() + value.len() > self.max_size {
            return false;
        }
        self.insert_new(key, value);
        true
    }

    /// Replace the value for an existing `key`, moving it to the tail
    /// and evicting as needed. Returns `false` (no change) if `key` is
    /// absent.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        let Some(&handle) = self.index.get(key) else {
            return false;
        };
        let value = value.into();
        if self.key_of(handle).len() + value.len() > self.max_size {
            return false;
        }
        self.replace_and_touch(handle, value);
        true
    }

    /// Look up `key`, moving it to the tail on a hit.
    pub fn get(&mut self, key: &str) -> Option<&str> {
        let handle = *self.index.get(key)?;
        self.move_to_tail(handle);
        Some(self.node(handle).value.as_str())
    }

    /// Remove `key` if present. Does not affect recency order of other
    /// entries. Returns `false` if `key` was absent.
    pub fn delete(&mut self, key: &str) -> bool {
        let Some(handle) = self.index.remove(key) else {
            return false;
        };
        let node = self.nodes[handle].take().expect("index pointed at a live node");
        self.actual_size -= node.key.len() + node.value.len();
        self.unlink(handle, node.prev, node.next);
        self.free.push(handle);
        true
    }

    fn node(&self, handle: usize) -> &Node {
        self.nodes[handle].as_ref().expect("handle points at a live node")
    }

    fn key_of(&self, handle: usize) -> &str {
        &self.node(handle).key
    }

    fn insert_new(&mut self, key: String, value: String) {
        while key.len() + value.len() + self.actual_size > self.max_size {
            self.evict_head();
        }
        self.actual_size += key.len() + value.len();
        let handle = self.alloc(key.clone(), value);
        self.push_tail(handle);
        self.index.insert(key, handle);
    }

    fn replace_and_touch(&mut self, handle: usize, new_value: String) {
        self.move_to_tail(handle);

        let old_len = self.node(handle).value.len() as i64;
        let size_diff = new_value.len() as i64 - old_len;
        while self.actual_size as i64 + size_diff > self.max_size as i64 {
            self.evict_head();
        }
        self.actual_size = (self.actual_size as i64 + size_diff) as usize;
        self.nodes[handle].as_mut().unwrap().value = new_value;
    }

    /// Remove the head (least-recently-used) node.
    fn evict_head(&mut self) {
        let handle = self.head.expect("evict_head called on an empty cache");
        let node = self.nodes[handle].take().expect("head handle is always live");
        self.index.remove(&node.key);
        self.actual_size -= node.key.len() + node.value.len();
        self.unlink(handle, None, node.next);
        self.free.push(handle);
    }

    fn alloc(&mut self, key: String, value: String) -> usize {
        let node = Node {
            key,
            value,
            prev: None,
            next: None,
        };
        if let Some(handle) = self.free.pop() {
            self.nodes[handle] = Some(node);
            handle
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    /// Detach `handle` from the list given its *current* `prev`/`next`.
    /// Leaves `handle`'s own `prev`/`next` fields untouched — callers
    /// either discard the node (eviction/delete) or immediately
    /// reattach it (move-to-tail).
    fn unlink(&mut self, handle: usize, prev: Option<usize>, next: Option<usize>) {
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
        let _ = handle;
    }

    fn push_tail(&mut self, handle: usize) {
        if let Some(t) = self.tail {
            self.nodes[t].as_mut().unwrap().next = Some(handle);
        } else {
            self.head = Some(handle);
        }
        let node = self.nodes[handle].as_mut().unwrap();
        node.prev = self.tail;
        node.next = None;
        self.tail = Some(handle);
    }

    fn move_to_tail(&mut self, handle: usize) {
        if self.tail == Some(handle) {
            return;
        }
        let (prev, next) = {
            let node = self.node(handle);
            (node.prev, node.next)
        };
        self.unlink(handle, prev, next);
        self.push_tail(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(cache: &Cache) -> Vec<String> {
        let mut out = Vec::new();
        let mut cur = cache.head;
        while let Some(h) = cur {
            let node = cache.node(h);
            out.push(node.key.clone());
            cur = node.next;
        }
        out
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut c = Cache::new(100);
        assert!(c.put("a", "1"));
        assert_eq!(c.get("a"), Some("1"));
    }

    #[test]
    fn second_put_overwrites_value() {
        let mut c = Cache::new(100);
        c.put("a", "1");
        c.put("a", "2");
        assert_eq!(c.get("a"), Some("2"));
    }

    #[test]
    fn put_if_absent_keeps_first_value() {
        let mut c = Cache::new(100);
        assert!(c.put_if_absent("a", "1"));
        assert!(!c.put_if_absent("a", "2"));
        assert_eq!(c.get("a"), Some("1"));
    }

    #[test]
    fn delete_then_get_returns_none() {
        let mut c = Cache::new(100);
        c.put("a", "1");
        assert!(c.delete("a"));
        assert_eq!(c.get("a"), None);
        assert!(!c.delete("a"));
    }

    #[test]
    fn set_fails_on_missing_key() {
        let mut c = Cache::new(100);
        assert!(!c.set("missing", "x"));
    }

    // Scenario 1 from the spec: cascading eviction of multiple heads.
    #[test]
    fn scenario_cascading_eviction() {
        let mut c = Cache::new(10);
        assert!(c.put("a", "1"));
        assert!(c.put("bb", "22"));
        assert!(c.put("c", "3"));
        assert_eq!(order(&c), vec!["a", "bb", "c"]);

        assert!(c.put("dddd", "4")); // size 5, evicts a (2) then bb (4)
        assert_eq!(order(&c), vec!["c", "dddd"]);
        assert_eq!(c.actual_size(), 7);
        assert_eq!(c.get("a"), None);
        assert_eq!(c.get("bb"), None);
    }

    // Scenario 2: an oversized single entry fails and leaves the cache empty.
    #[test]
    fn scenario_oversized_entry_rejected() {
        let mut c = Cache::new(4);
        assert!(!c.put("key", "val")); // 3 + 3 = 6 > 4
        assert!(c.is_empty());
        assert_eq!(c.actual_size(), 0);
    }

    // Scenario 3: Get promotes to tail; eviction targets the true LRU.
    #[test]
    fn scenario_get_promotes_and_protects_from_eviction() {
        let mut c = Cache::new(8);
        assert!(c.put("a", "1"));
        assert_eq!(c.get("a"), Some("1"));
        assert!(c.put("b", "2"));
        assert_eq!(c.get("a"), Some("1")); // promote a back to tail
        assert!(c.put("c", "3")); // must evict b, not a
        assert_eq!(c.get("b"), None);
        assert_eq!(c.get("a"), Some("1"));
        assert_eq!(c.get("c"), Some("3"));
    }

    #[test]
    fn actual_size_matches_sum_of_entries_and_never_exceeds_max() {
        let mut c = Cache::new(20);
        for (k, v) in [("a", "11"), ("bb", "22"), ("ccc", "333"), ("d", "4")] {
            c.put(k, v);
            assert!(c.actual_size() <= c.max_size());
            let expected: usize = order(&c)
                .iter()
                .map(|k| {
                    let h = c.index[k];
                    let n = c.node(h);
                    n.key.len() + n.value.len()
                })
                .sum();
            assert_eq!(c.actual_size(), expected);
        }
    }

    #[test]
    fn no_eviction_when_capacity_is_sufficient() {
        let mut c = Cache::new(1000);
        for i in 0..50 {
            assert!(c.put(format!("k{i}"), format!("v{i}")));
        }
        assert_eq!(c.len(), 50);
    }
}
