//! arena.rs
//! Hash-consed columnar node storage.
//!
//! Nodes are append-only and a node's children always precede it, so any
//! ascending walk over ids visits children before parents.

use super::hash::{preimage, Blake3Hasher, NodeHash, NodeHasher};
use super::node::{ExprNode, NodeMetadata};
use crate::store::{BaseDataset, NodeId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ExprArena {
    kinds: Vec<ExprNode>,
    hashes: Vec<NodeHash>,
    meta: Vec<NodeMetadata>,

    // Canonical hash -> slot. This is the dedup table.
    index: HashMap<NodeHash, NodeId>,
    hasher: Arc<dyn NodeHasher>,
}

impl Default for ExprArena {
    fn default() -> Self {
        Self::with_hasher(Arc::new(Blake3Hasher))
    }
}

impl ExprArena {
    pub fn new() -> Self { Self::default() }

    pub fn with_hasher(hasher: Arc<dyn NodeHasher>) -> Self {
        Self {
            kinds: Vec::new(),
            hashes: Vec::new(),
            meta: Vec::new(),
            index: HashMap::new(),
            hasher,
        }
    }

    pub fn count(&self) -> usize { self.kinds.len() }
    pub fn is_empty(&self) -> bool { self.kinds.is_empty() }
    pub fn hasher(&self) -> &Arc<dyn NodeHasher> { &self.hasher }

    /// Returns the slot of a structurally identical node, or appends `node`.
    ///
    /// `dataset` is the content behind a variable's ref and is ignored for
    /// other kinds. Children must already live in this arena.
    pub fn intern(&mut self, node: ExprNode, dataset: Option<&BaseDataset>, alias: Option<&str>) -> NodeId {
        let hash = {
            let hashes = &self.hashes;
            let bytes = preimage(&node, dataset, |i| hashes[i]);
            self.hasher.digest(&bytes)
        };

        if let Some(&existing) = self.index.get(&hash) {
            tracing::trace!(node = existing.0, %hash, "dedup hit");
            if let Some(alias) = alias {
                self.set_alias(existing, alias);
            }
            return existing;
        }

        let id = NodeId::new(self.kinds.len());
        self.kinds.push(node);
        self.hashes.push(hash);
        self.meta.push(NodeMetadata { print_alias: alias.map(str::to_owned) });
        self.index.insert(hash, id);
        id
    }

    /// Attaches a display alias. The first alias a node receives is kept;
    /// later differing aliases are ignored.
    pub fn set_alias(&mut self, id: NodeId, alias: &str) {
        let slot = &mut self.meta[id.index()].print_alias;
        match slot.as_deref() {
            None => *slot = Some(alias.to_owned()),
            Some(current) if current != alias => {
                tracing::trace!(node = id.0, kept = %current, ignored = alias, "alias collision");
            }
            Some(_) => {}
        }
    }

    // --- Accessors ---
    pub fn node(&self, id: NodeId) -> &ExprNode { &self.kinds[id.index()] }
    pub fn get(&self, id: NodeId) -> Option<&ExprNode> { self.kinds.get(id.index()) }
    pub fn hash(&self, id: NodeId) -> NodeHash { self.hashes[id.index()] }
    pub fn meta(&self, id: NodeId) -> &NodeMetadata { &self.meta[id.index()] }
    pub fn find(&self, hash: &NodeHash) -> Option<NodeId> { self.index.get(hash).copied() }

    pub fn print_alias(&self, id: NodeId) -> Option<&str> {
        self.meta[id.index()].print_alias.as_deref()
    }
}
