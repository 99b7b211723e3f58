use crate::SmallKeyHashMap;

use slab::Slab;
use static_assertions::const_assert_eq;
use std::hash::Hash;
use std::mem;
use std::num::NonZeroU32;

/// Identifies a node in the [`LruList`] arena.
///
/// An `Option<NodeId>` still only requires 32 bits, so the links between nodes stay small.
type NodeId = NonZeroU32;

const_assert_eq!(mem::size_of::<Option<NodeId>>(), mem::size_of::<NodeId>());

struct LruNode<K, V> {
    key: K,
    value: V,
    /// Toward the most recently used end.
    newer: Option<NodeId>,
    /// Toward the least recently used end.
    older: Option<NodeId>,
}

/// A map that remembers the order in which its entries were last used.
///
/// Nodes live in a [`Slab`] and link to each other by 32-bit ids, so touching an entry is `O(1)` and never reallocates.
/// The list itself never evicts anything; owners call [`LruList::pop_least_recent`] when their own size policy says so.
pub struct LruList<K, V> {
    nodes: Slab<LruNode<K, V>>,
    index: SmallKeyHashMap<K, NodeId>,
    newest: Option<NodeId>,
    oldest: Option<NodeId>,
}

impl<K, V> Default for LruList<K, V>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> LruList<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            nodes: Slab::new(),
            index: SmallKeyHashMap::default(),
            newest: None,
            oldest: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut index = SmallKeyHashMap::default();
        index.reserve(capacity);
        Self {
            nodes: Slab::with_capacity(capacity),
            index,
            newest: None,
            oldest: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the value for `key` and marks it as the most recently used entry.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let id = *self.index.get(key)?;
        self.move_to_front(id);
        self.nodes.get(id_to_index(id)).map(|n| &n.value)
    }

    /// Returns the value for `key` without changing the usage order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let id = *self.index.get(key)?;
        self.nodes.get(id_to_index(id)).map(|n| &n.value)
    }

    /// Inserts `value` as the most recently used entry. If `key` was already present, its old value is returned.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&id) = self.index.get(&key) {
            self.move_to_front(id);
            let node = &mut self.nodes[id_to_index(id)];
            return Some(mem::replace(&mut node.value, value));
        }

        let id = index_to_id(self.nodes.insert(LruNode {
            key: key.clone(),
            value,
            newer: None,
            older: None,
        }));
        self.index.insert(key, id);
        self.link_front(id);
        None
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let id = self.index.remove(key)?;
        self.unlink(id);
        Some(self.nodes.remove(id_to_index(id)).value)
    }

    /// Removes and returns the least recently used entry.
    pub fn pop_least_recent(&mut self) -> Option<(K, V)> {
        let id = self.oldest?;
        self.unlink(id);
        let node = self.nodes.remove(id_to_index(id));
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Removes every entry, returning them from least to most recently used.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(entry) = self.pop_least_recent() {
            out.push(entry);
        }
        out
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.newest;
        std::iter::from_fn(move || {
            let node = &self.nodes[id_to_index(cursor?)];
            cursor = node.older;
            Some(&node.key)
        })
    }

    fn move_to_front(&mut self, id: NodeId) {
        if self.newest == Some(id) {
            return;
        }
        self.unlink(id);
        self.link_front(id);
    }

    fn link_front(&mut self, id: NodeId) {
        let old_newest = self.newest;
        {
            let node = &mut self.nodes[id_to_index(id)];
            node.newer = None;
            node.older = old_newest;
        }
        match old_newest {
            Some(n) => self.nodes[id_to_index(n)].newer = Some(id),
            None => self.oldest = Some(id),
        }
        self.newest = Some(id);
    }

    fn unlink(&mut self, id: NodeId) {
        let (newer, older) = {
            let node = &self.nodes[id_to_index(id)];
            (node.newer, node.older)
        };
        match newer {
            Some(n) => self.nodes[id_to_index(n)].older = older,
            None => self.newest = older,
        }
        match older {
            Some(o) => self.nodes[id_to_index(o)].newer = newer,
            None => self.oldest = newer,
        }
    }
}

const MAX_VALID_INDEX: usize = (u32::MAX - 1) as usize;

const fn id_to_index(id: NodeId) -> usize {
    // XOR flips all of the bits so that u32::MAX maps to slab index zero.
    (id.get() ^ u32::MAX) as usize
}

fn index_to_id(index: usize) -> NodeId {
    assert!(index <= MAX_VALID_INDEX);
    // SAFETY: index < u32::MAX, so the flipped value is nonzero.
    unsafe { NodeId::new_unchecked((index as u32) ^ u32::MAX) }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
