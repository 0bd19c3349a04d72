//! Builds derivative expressions inside the same arena as their source.
//!
//! The numeric pass in `partials` is what propagation uses; this module is for
//! callers that want `∂T/∂l` as an expression of its own, e.g. to inspect it,
//! encode it as a token, or evaluate it at many points.

use super::ledger::PropagationError;
use super::partials::LeafKey;
use crate::analysis::topology;
use crate::graph::{BinaryOp, ExprNode, ExpressionGraph, ScalarValue, UnaryOp};
use crate::store::NodeId;

/// `∂root/∂leaf` as a new node. `None` means the derivative is identically
/// zero. Any `Mod` node under `root` fails the call.
pub fn differentiate(graph: &mut ExpressionGraph, root: NodeId, leaf: LeafKey) -> Result<Option<NodeId>, PropagationError> {
    let order = topology::post_order(graph.arena(), root);
    let mut derivs: Vec<Option<NodeId>> = vec![None; graph.node_count()];

    for &node in &order {
        let kind = *graph.node(node);
        let d = match kind {
            ExprNode::Variable { dataset, component } => {
                if (dataset, component) == leaf {
                    Some(graph.constant(ScalarValue::Int32(1)))
                } else {
                    None
                }
            }
            ExprNode::Constant(_) => None,
            ExprNode::Unary { op, child } => derivs[child.index()].and_then(|dx| unary_rule(graph, op, node, child, dx)),
            ExprNode::Binary { op, lhs, rhs } => {
                binary_rule(graph, op, (lhs, derivs[lhs.index()]), (rhs, derivs[rhs.index()]))?
            }
        };
        derivs[node.index()] = d;
    }

    Ok(derivs[root.index()])
}

fn unary_rule(graph: &mut ExpressionGraph, op: UnaryOp, node: NodeId, x: NodeId, dx: NodeId) -> Option<NodeId> {
    match op {
        UnaryOp::Negate => Some(graph.neg(dx)),
        UnaryOp::Abs => {
            let s = graph.sign(x);
            Some(graph.mul(s, dx))
        }
        UnaryOp::Sign => None,
        // exp(x) is the node itself.
        UnaryOp::Exp => Some(graph.mul(node, dx)),
        UnaryOp::Ln => Some(graph.div(dx, x)),
    }
}

fn binary_rule(
    graph: &mut ExpressionGraph,
    op: BinaryOp,
    (x, dx): (NodeId, Option<NodeId>),
    (y, dy): (NodeId, Option<NodeId>),
) -> Result<Option<NodeId>, PropagationError> {
    let d = match op {
        BinaryOp::Mod => return Err(PropagationError::NonDifferentiable(op.into())),
        _ if dx.is_none() && dy.is_none() => None,
        BinaryOp::Add => sum(graph, dx, dy),
        BinaryOp::Sub => match (dx, dy) {
            (Some(dx), Some(dy)) => Some(graph.sub(dx, dy)),
            (Some(dx), None) => Some(dx),
            (None, Some(dy)) => Some(graph.neg(dy)),
            (None, None) => None,
        },
        BinaryOp::Mul => {
            let left = dx.map(|dx| graph.mul(dx, y));
            let right = dy.map(|dy| graph.mul(x, dy));
            sum(graph, left, right)
        }
        BinaryOp::Div => match dy {
            None => dx.map(|dx| graph.div(dx, y)),
            Some(dy) => {
                // (dx*y - x*dy) / y^2
                let x_dy = graph.mul(x, dy);
                let numer = match dx {
                    Some(dx) => {
                        let dx_y = graph.mul(dx, y);
                        graph.sub(dx_y, x_dy)
                    }
                    None => graph.neg(x_dy),
                };
                let y2 = graph.mul(y, y);
                Some(graph.div(numer, y2))
            }
        },
        BinaryOp::Pow => {
            // f^(g-1) * (g*df + f*ln(f)*dg)
            let base_term = dx.map(|dx| graph.mul(y, dx));
            let exp_term = dy.map(|dy| {
                let ln_f = graph.ln(x);
                let f_ln_f = graph.mul(x, ln_f);
                graph.mul(f_ln_f, dy)
            });
            let inner = sum(graph, base_term, exp_term);
            let one = graph.constant(ScalarValue::Int32(1));
            let g_minus_1 = graph.sub(y, one);
            let scale = graph.pow(x, g_minus_1);
            inner.map(|inner| graph.mul(scale, inner))
        }
    };
    Ok(d)
}

fn sum(graph: &mut ExpressionGraph, a: Option<NodeId>, b: Option<NodeId>) -> Option<NodeId> {
    match (a, b) {
        (Some(a), Some(b)) => Some(graph.add(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}
