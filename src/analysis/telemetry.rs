use crate::analysis::topology;
use crate::graph::{ExprNode, ExpressionGraph};
use crate::store::NodeId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Shape summary of the expression under one root.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpressionStats {
    /// Arena entries reachable from the root.
    pub unique_nodes: usize,
    /// Nodes the tree encoding will write (sharing expanded).
    pub expanded_nodes: u64,
    /// Reachable nodes consumed by more than one parent.
    pub shared_nodes: usize,
    pub depth: usize,
    pub variables: usize,
    pub constants: usize,
    /// Distinct datasets referenced.
    pub datasets: usize,
    pub op_counts: BTreeMap<String, usize>,
}

impl ExpressionStats {
    pub fn analyze(graph: &ExpressionGraph, root: NodeId) -> Self {
        let arena = graph.arena();
        let order = topology::post_order(arena, root);

        let mut consumers = vec![0u32; arena.count()];
        let mut op_counts = BTreeMap::new();
        let mut datasets = BTreeSet::new();
        let mut variables = 0;
        let mut constants = 0;

        for &node in &order {
            match *arena.node(node) {
                ExprNode::Variable { dataset, .. } => {
                    variables += 1;
                    datasets.insert(dataset);
                }
                ExprNode::Constant(_) => constants += 1,
                ExprNode::Unary { op, child } => {
                    consumers[child.index()] += 1;
                    *op_counts.entry(op.name().to_string()).or_insert(0) += 1;
                }
                ExprNode::Binary { op, lhs, rhs } => {
                    consumers[lhs.index()] += 1;
                    // x op x consumes x once.
                    if rhs != lhs {
                        consumers[rhs.index()] += 1;
                    }
                    *op_counts.entry(op.name().to_string()).or_insert(0) += 1;
                }
            }
        }

        Self {
            unique_nodes: order.len(),
            expanded_nodes: topology::expanded_size(arena, root),
            shared_nodes: consumers.iter().filter(|&&c| c > 1).count(),
            depth: topology::depth(arena, root),
            variables,
            constants,
            datasets: datasets.len(),
            op_counts,
        }
    }

    /// Expanded-to-unique ratio. Above 1 means the tree form repeats work the
    /// DAG shares.
    pub fn sharing_factor(&self) -> f64 {
        if self.unique_nodes == 0 {
            return 0.0;
        }
        self.expanded_nodes as f64 / self.unique_nodes as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Component;

    #[test]
    fn test_shared_subexpression_counts() {
        let mut g = ExpressionGraph::new();
        let a = g.register_dataset(1, b"a").unwrap();
        let b = g.register_dataset(1, b"b").unwrap();
        let va = g.variable(a, Component::VALUE).unwrap();
        let vb = g.variable(b, Component::VALUE).unwrap();
        let x = g.add(va, vb);
        let y = g.sub(x, vb);
        let root = g.mul(x, y);

        let stats = ExpressionStats::analyze(&g, root);
        assert_eq!(stats.unique_nodes, 5);
        // mul(add(a,b), sub(add(a,b), b))
        assert_eq!(stats.expanded_nodes, 9);
        // x feeds mul and sub; b feeds add and sub.
        assert_eq!(stats.shared_nodes, 2);
        assert_eq!(stats.depth, 4);
        assert_eq!(stats.variables, 2);
        assert_eq!(stats.datasets, 2);
        assert_eq!(stats.op_counts.get("add"), Some(&1));
        assert_eq!(stats.op_counts.get("mul"), Some(&1));
        assert!((stats.sharing_factor() - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_stats_serialize() {
        let mut g = ExpressionGraph::new();
        let c = g.constant(crate::graph::ScalarValue::Int32(4));
        let root = g.exp(c);
        let json = serde_json::to_value(ExpressionStats::analyze(&g, root)).unwrap();
        assert_eq!(json["constants"], 1);
        assert_eq!(json["op_counts"]["exp"], 1);
    }
}
