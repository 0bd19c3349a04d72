//! Structural pattern matching over the expression DAG.
//!
//! A pattern is an expression shape with numbered wildcards. Matching binds
//! each wildcard to the arena node it covers; a wildcard used twice must cover
//! the same node, which under hash-consing means the same subexpression.

use super::dag::ExpressionGraph;
use super::hash::NodeHash;
use super::node::{BinaryOp, ExprNode, ScalarValue, UnaryOp};
use crate::analysis::topology;
use crate::store::NodeId;
use std::collections::BTreeMap;
use std::fmt;

/// Wildcard number to the node it matched.
pub type Bindings = BTreeMap<u16, NodeId>;

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// `#n`: matches any subexpression.
    Any(u16),
    /// Matches the subexpression with this canonical hash.
    Exact(NodeHash),
    /// Matches a constant of equal numeric value, whatever its stored type.
    Constant(ScalarValue),
    Unary(UnaryOp, Box<Pattern>),
    Binary(BinaryOp, Box<Pattern>, Box<Pattern>),
}

impl Pattern {
    pub fn unary(op: UnaryOp, x: Pattern) -> Self { Self::Unary(op, Box::new(x)) }
    pub fn binary(op: BinaryOp, x: Pattern, y: Pattern) -> Self { Self::Binary(op, Box::new(x), Box::new(y)) }

    /// Pattern matching exactly the subexpression at `node`.
    pub fn exact(graph: &ExpressionGraph, node: NodeId) -> Self { Self::Exact(graph.hash(node)) }

    /// Bindings when the expression at `node` has this shape.
    pub fn match_node(&self, graph: &ExpressionGraph, node: NodeId) -> Option<Bindings> {
        let mut bindings = Bindings::new();
        let mut work: Vec<(&Pattern, NodeId)> = vec![(self, node)];

        while let Some((pattern, node)) = work.pop() {
            match (pattern, *graph.node(node)) {
                (Pattern::Any(n), _) => match bindings.get(n) {
                    Some(&bound) if bound != node => return None,
                    Some(_) => {}
                    None => {
                        bindings.insert(*n, node);
                    }
                },
                (Pattern::Exact(hash), _) => {
                    if graph.hash(node) != *hash {
                        return None;
                    }
                }
                (Pattern::Constant(expected), ExprNode::Constant(value)) => {
                    if expected.as_f64() != value.as_f64() {
                        return None;
                    }
                }
                (Pattern::Unary(p_op, p_child), ExprNode::Unary { op, child }) if *p_op == op => {
                    work.push((&**p_child, child));
                }
                (Pattern::Binary(p_op, p_lhs, p_rhs), ExprNode::Binary { op, lhs, rhs }) if *p_op == op => {
                    work.push((&**p_rhs, rhs));
                    work.push((&**p_lhs, lhs));
                }
                _ => return None,
            }
        }

        Some(bindings)
    }

    pub fn matches(&self, graph: &ExpressionGraph, node: NodeId) -> bool {
        self.match_node(graph, node).is_some()
    }

    /// Every subexpression under `root` that matches, children before parents.
    pub fn find_all(&self, graph: &ExpressionGraph, root: NodeId) -> Vec<(NodeId, Bindings)> {
        topology::post_order(graph.arena(), root)
            .into_iter()
            .filter_map(|node| self.match_node(graph, node).map(|b| (node, b)))
            .collect()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any(n) => write!(f, "#{}", n),
            Self::Exact(hash) => write!(f, "{}", hash),
            Self::Constant(value) => write!(f, "{}", value),
            Self::Unary(op, x) => write!(f, "{}({})", op.name(), x),
            Self::Binary(op, x, y) => write!(f, "({} {} {})", x, op.symbol(), y),
        }
    }
}
