use crate::graph::ExprArena;
use crate::store::NodeId;

/// Returns the nodes reachable from `root`, each exactly once, with every
/// child ahead of its consumers. `root` is always last.
///
/// Walks with an explicit stack: chains of derived computations can be far
/// deeper than the call stack allows.
pub fn post_order(arena: &ExprArena, root: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut state = vec![VisitState::None; arena.count()];
    let mut stack = vec![(root, false)];

    while let Some((node, expanded)) = stack.pop() {
        let idx = node.index();
        if expanded {
            state[idx] = VisitState::Visited;
            order.push(node);
            continue;
        }
        if state[idx] != VisitState::None {
            continue;
        }
        state[idx] = VisitState::Visiting;
        stack.push((node, true));

        // Reverse so the left operand is emitted first.
        for &child in arena.node(node).children().iter().rev() {
            if state[child.index()] == VisitState::None {
                stack.push((child, false));
            }
        }
    }

    order
}

/// Number of nodes on the longest root-to-leaf path (a leaf alone is 1).
pub fn depth(arena: &ExprArena, root: NodeId) -> usize {
    let order = post_order(arena, root);
    let mut depths = vec![0usize; arena.count()];
    for &node in &order {
        let below = arena
            .node(node)
            .children()
            .iter()
            .map(|c| depths[c.index()])
            .max()
            .unwrap_or(0);
        depths[node.index()] = below + 1;
    }
    depths[root.index()]
}

/// Number of nodes a pre-order expansion of the DAG would visit, i.e. the
/// node count of the tree encoding. Saturates instead of overflowing on
/// pathological sharing.
pub fn expanded_size(arena: &ExprArena, root: NodeId) -> u64 {
    let order = post_order(arena, root);
    let mut sizes = vec![0u64; arena.count()];
    for &node in &order {
        let below = arena
            .node(node)
            .children()
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(sizes[c.index()]));
        sizes[node.index()] = below.saturating_add(1);
    }
    sizes[root.index()]
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting,
    Visited,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BinaryOp, ExprNode, UnaryOp, ScalarValue};

    fn constant(arena: &mut ExprArena, v: f64) -> NodeId {
        arena.intern(ExprNode::Constant(ScalarValue::Float64(v)), None, None)
    }

    #[test]
    fn test_post_order_diamond() {
        // Shape: A feeds B and C, B+C -> D
        let mut arena = ExprArena::new();
        let a = constant(&mut arena, 1.0);
        let b = arena.intern(ExprNode::Unary { op: UnaryOp::Exp, child: a }, None, None);
        let c = arena.intern(ExprNode::Unary { op: UnaryOp::Negate, child: a }, None, None);
        let d = arena.intern(ExprNode::Binary { op: BinaryOp::Add, lhs: b, rhs: c }, None, None);

        let res = post_order(&arena, d);
        assert_eq!(res.len(), 4);
        let pos = |id: NodeId| res.iter().position(|&x| x == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));
        assert_eq!(depth(&arena, d), 3);
        assert_eq!(expanded_size(&arena, d), 5);
    }

    #[test]
    fn test_post_order_skips_unreachable() {
        let mut arena = ExprArena::new();
        let a = constant(&mut arena, 1.0);
        let _unused = constant(&mut arena, 2.0);
        let b = arena.intern(ExprNode::Binary { op: BinaryOp::Mul, lhs: a, rhs: a }, None, None);
        assert_eq!(post_order(&arena, b), vec![a, b]);
    }

    #[test]
    fn test_deep_chain_does_not_overflow_stack() {
        let mut arena = ExprArena::new();
        let mut node = constant(&mut arena, 0.5);
        for _ in 0..200_000 {
            node = arena.intern(ExprNode::Unary { op: UnaryOp::Negate, child: node }, None, None);
        }
        assert_eq!(post_order(&arena, node).len(), 200_001);
        assert_eq!(depth(&arena, node), 200_001);
    }
}
