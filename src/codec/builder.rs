//! builder.rs
//! Incremental construction of version-0 tokens.

use super::token::Token;
use crate::config::{CodecSettings, FloatWidth};
use crate::display::{parse_expression, ParseError};
use crate::graph::{ExpressionGraph, NodeHasher, ScalarValue};
use crate::store::{Component, NodeId, RegistryError};
use std::sync::Arc;

/// Collects datasets and expression nodes, then emits tokens rooted at any
/// node built so far. Nodes are hash-consed, so building the same
/// subexpression twice returns the same id.
#[derive(Debug, Clone, Default)]
pub struct TokenBuilder {
    graph: ExpressionGraph,
    settings: CodecSettings,
}

impl TokenBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn with_settings(settings: CodecSettings) -> Self {
        Self { graph: ExpressionGraph::new(), settings }
    }

    /// Builder whose nodes hash with `hasher`. Tokens it emits must be decoded
    /// with the same hasher to keep their canonical hashes.
    pub fn with_hasher(settings: CodecSettings, hasher: Arc<dyn NodeHasher>) -> Self {
        Self { graph: ExpressionGraph::with_hasher(hasher), settings }
    }

    pub fn graph(&self) -> &ExpressionGraph { &self.graph }
    pub fn graph_mut(&mut self) -> &mut ExpressionGraph { &mut self.graph }
    pub fn settings(&self) -> &CodecSettings { &self.settings }

    // --- Leaves ---

    /// Variable on the value component of a base dataset.
    pub fn dataset(&mut self, hash_type: u16, hash_bytes: &[u8], alias: Option<&str>) -> Result<NodeId, RegistryError> {
        self.component(hash_type, hash_bytes, Component::VALUE, alias)
    }

    pub fn component(
        &mut self,
        hash_type: u16,
        hash_bytes: &[u8],
        component: Component,
        alias: Option<&str>,
    ) -> Result<NodeId, RegistryError> {
        let dataset = self.graph.register_dataset(hash_type, hash_bytes)?;
        self.graph.variable_with_alias(dataset, component, alias)
    }

    pub fn constant(&mut self, value: ScalarValue) -> NodeId {
        self.graph.constant(value)
    }

    /// Float constant stored at the configured width.
    pub fn float(&mut self, value: f64) -> NodeId {
        let value = match self.settings.float_width {
            FloatWidth::F32 => ScalarValue::Float32(value as f32),
            FloatWidth::F64 => ScalarValue::Float64(value),
        };
        self.graph.constant(value)
    }

    /// Integer constant in the narrowest integer type that holds it.
    pub fn integer(&mut self, value: i64) -> NodeId {
        let value = match i32::try_from(value) {
            Ok(v) => ScalarValue::Int32(v),
            Err(_) => ScalarValue::Int64(value),
        };
        self.graph.constant(value)
    }

    // --- Operators ---
    pub fn neg(&mut self, x: NodeId) -> NodeId { self.graph.neg(x) }
    pub fn abs(&mut self, x: NodeId) -> NodeId { self.graph.abs(x) }
    pub fn sign(&mut self, x: NodeId) -> NodeId { self.graph.sign(x) }
    pub fn exp(&mut self, x: NodeId) -> NodeId { self.graph.exp(x) }
    pub fn ln(&mut self, x: NodeId) -> NodeId { self.graph.ln(x) }

    pub fn add(&mut self, x: NodeId, y: NodeId) -> NodeId { self.graph.add(x, y) }
    pub fn sub(&mut self, x: NodeId, y: NodeId) -> NodeId { self.graph.sub(x, y) }
    pub fn mul(&mut self, x: NodeId, y: NodeId) -> NodeId { self.graph.mul(x, y) }
    pub fn div(&mut self, x: NodeId, y: NodeId) -> NodeId { self.graph.div(x, y) }
    pub fn modulo(&mut self, x: NodeId, y: NodeId) -> NodeId { self.graph.modulo(x, y) }
    pub fn pow(&mut self, x: NodeId, y: NodeId) -> NodeId { self.graph.pow(x, y) }

    pub fn alias(&mut self, id: NodeId, alias: &str) {
        self.graph.alias(id, alias);
    }

    /// Builds an infix expression. Names refer to aliases given so far or to
    /// `d<ref>.<component>`.
    pub fn parse(&mut self, text: &str) -> Result<NodeId, ParseError> {
        parse_expression(&mut self.graph, text)
    }

    /// Imports the tree of a version-0 token, remapping its datasets into
    /// this builder's registry. `None` for a contribution token, which has no
    /// tree to import.
    pub fn adopt(&mut self, token: &Token) -> Result<Option<NodeId>, RegistryError> {
        match token.expression() {
            Some((graph, root)) => Ok(Some(self.graph.import(graph, root)?)),
            None => Ok(None),
        }
    }

    /// Emits a version-0 token holding only the datasets and nodes reachable
    /// from `root`.
    pub fn token(&self, root: NodeId) -> Result<Token, RegistryError> {
        let mut pruned = ExpressionGraph::with_hasher(self.graph.hasher().clone());
        let root = pruned.import(&self.graph, root)?;
        Ok(Token::from_expression(pruned, root))
    }
}
