//! dag.rs
//! Pairs the node arena with the dataset registry its variables point into.

use super::arena::ExprArena;
use super::hash::{NodeHash, NodeHasher};
use super::node::{BinaryOp, ExprNode, ScalarValue, UnaryOp};
use crate::analysis::topology;
use crate::store::{BaseDataset, Component, DatasetRef, DatasetRegistry, NodeId, RegistryError};
use std::collections::HashMap;
use std::sync::Arc;

/// An expression DAG together with the datasets its variables reference.
#[derive(Debug, Clone, Default)]
pub struct ExpressionGraph {
    datasets: DatasetRegistry,
    pub(crate) store: ExprArena,
}

impl ExpressionGraph {
    pub fn new() -> Self { Self::default() }

    pub fn with_hasher(hasher: Arc<dyn NodeHasher>) -> Self {
        Self { datasets: DatasetRegistry::new(), store: ExprArena::with_hasher(hasher) }
    }

    /// Starts an empty arena over an existing registry, as a decoder does.
    pub fn with_datasets(datasets: DatasetRegistry, hasher: Arc<dyn NodeHasher>) -> Self {
        Self { datasets, store: ExprArena::with_hasher(hasher) }
    }

    pub fn hasher(&self) -> &Arc<dyn NodeHasher> { self.store.hasher() }

    pub fn datasets(&self) -> &DatasetRegistry { &self.datasets }
    pub fn arena(&self) -> &ExprArena { &self.store }
    pub fn node_count(&self) -> usize { self.store.count() }

    pub fn register_dataset(&mut self, hash_type: u16, hash_bytes: &[u8]) -> Result<DatasetRef, RegistryError> {
        self.datasets.register(hash_type, hash_bytes)
    }

    // --- Constructors ---

    pub fn variable(&mut self, dataset: DatasetRef, component: Component) -> Result<NodeId, RegistryError> {
        self.variable_with_alias(dataset, component, None)
    }

    pub fn variable_with_alias(
        &mut self,
        dataset: DatasetRef,
        component: Component,
        alias: Option<&str>,
    ) -> Result<NodeId, RegistryError> {
        let content = self.datasets.resolve(dataset)?;
        Ok(self.store.intern(ExprNode::Variable { dataset, component }, Some(content), alias))
    }

    pub fn constant(&mut self, value: ScalarValue) -> NodeId {
        self.store.intern(ExprNode::Constant(value), None, None)
    }

    pub fn unary(&mut self, op: UnaryOp, child: NodeId) -> NodeId {
        self.store.intern(ExprNode::Unary { op, child }, None, None)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.store.intern(ExprNode::Binary { op, lhs, rhs }, None, None)
    }

    pub fn neg(&mut self, x: NodeId) -> NodeId { self.unary(UnaryOp::Negate, x) }
    pub fn abs(&mut self, x: NodeId) -> NodeId { self.unary(UnaryOp::Abs, x) }
    pub fn sign(&mut self, x: NodeId) -> NodeId { self.unary(UnaryOp::Sign, x) }
    pub fn exp(&mut self, x: NodeId) -> NodeId { self.unary(UnaryOp::Exp, x) }
    pub fn ln(&mut self, x: NodeId) -> NodeId { self.unary(UnaryOp::Ln, x) }

    pub fn add(&mut self, x: NodeId, y: NodeId) -> NodeId { self.binary(BinaryOp::Add, x, y) }
    pub fn sub(&mut self, x: NodeId, y: NodeId) -> NodeId { self.binary(BinaryOp::Sub, x, y) }
    pub fn mul(&mut self, x: NodeId, y: NodeId) -> NodeId { self.binary(BinaryOp::Mul, x, y) }
    pub fn div(&mut self, x: NodeId, y: NodeId) -> NodeId { self.binary(BinaryOp::Div, x, y) }
    pub fn modulo(&mut self, x: NodeId, y: NodeId) -> NodeId { self.binary(BinaryOp::Mod, x, y) }
    pub fn pow(&mut self, x: NodeId, y: NodeId) -> NodeId { self.binary(BinaryOp::Pow, x, y) }

    pub fn alias(&mut self, id: NodeId, alias: &str) {
        self.store.set_alias(id, alias);
    }

    /// Copies the subgraph under `root` from `other` into this graph,
    /// registering its datasets here by content. Structurally identical
    /// nodes already present are reused, so canonical hashes are preserved.
    pub fn import(&mut self, other: &ExpressionGraph, root: NodeId) -> Result<NodeId, RegistryError> {
        let mut mapped: HashMap<NodeId, NodeId> = HashMap::new();
        let mut dataset_map: HashMap<DatasetRef, DatasetRef> = HashMap::new();

        for node in topology::post_order(&other.store, root) {
            let alias = other.store.print_alias(node);
            let local = match *other.store.node(node) {
                ExprNode::Variable { dataset, component } => {
                    let target = match dataset_map.get(&dataset) {
                        Some(&r) => r,
                        None => {
                            let content = other.datasets.resolve(dataset)?;
                            let r = self.datasets.register_dataset(content.clone())?;
                            dataset_map.insert(dataset, r);
                            r
                        }
                    };
                    self.variable_with_alias(target, component, alias)?
                }
                ExprNode::Constant(value) => self.constant(value),
                ExprNode::Unary { op, child } => self.unary(op, mapped[&child]),
                ExprNode::Binary { op, lhs, rhs } => self.binary(op, mapped[&lhs], mapped[&rhs]),
            };
            if let Some(alias) = alias {
                self.store.set_alias(local, alias);
            }
            mapped.insert(node, local);
        }

        Ok(mapped[&root])
    }

    /// True when no variable is reachable from `id`.
    pub fn is_constant(&self, id: NodeId) -> bool {
        topology::post_order(&self.store, id)
            .into_iter()
            .all(|n| !matches!(self.store.node(n), ExprNode::Variable { .. }))
    }

    /// Variables reachable from `root`, in post-order.
    pub fn variables(&self, root: NodeId) -> Vec<(NodeId, DatasetRef, Component)> {
        topology::post_order(&self.store, root)
            .into_iter()
            .filter_map(|n| match *self.store.node(n) {
                ExprNode::Variable { dataset, component } => Some((n, dataset, component)),
                _ => None,
            })
            .collect()
    }

    // --- Accessors ---
    pub fn node(&self, id: NodeId) -> &ExprNode { self.store.node(id) }
    pub fn hash(&self, id: NodeId) -> NodeHash { self.store.hash(id) }
    pub fn print_alias(&self, id: NodeId) -> Option<&str> { self.store.print_alias(id) }
    pub fn find(&self, hash: &NodeHash) -> Option<NodeId> { self.store.find(hash) }

    pub fn dataset_of(&self, dataset: DatasetRef) -> Result<&BaseDataset, RegistryError> {
        self.datasets.resolve(dataset)
    }
}
