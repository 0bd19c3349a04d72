//! Single-line infix rendering of an expression.

use super::trace::label;
use crate::analysis::topology;
use crate::graph::{BinaryOp, ExprNode, ExpressionGraph, ScalarValue, UnaryOp};
use crate::store::NodeId;

const ATOM: u8 = u8::MAX;
// Unary minus binds tighter than `*` but looser than `^`.
const PREFIX: u8 = 3;

/// Renders `root` as infix text. Inner nodes with a print alias print as the
/// alias; the root itself is always expanded unless it is a variable.
pub fn format_expression(graph: &ExpressionGraph, root: NodeId) -> String {
    let order = topology::post_order(graph.arena(), root);
    let mut rendered: Vec<Option<(String, u8)>> = vec![None; graph.node_count()];

    for &node in &order {
        let text = if node != root && graph.print_alias(node).is_some() {
            (label(graph, node), ATOM)
        } else {
            render(graph, node, &rendered)
        };
        rendered[node.index()] = Some(text);
    }

    rendered[root.index()].take().map(|(s, _)| s).unwrap_or_default()
}

fn render(graph: &ExpressionGraph, node: NodeId, done: &[Option<(String, u8)>]) -> (String, u8) {
    let part = |id: NodeId| part(done, id);

    match *graph.node(node) {
        ExprNode::Variable { .. } => (label(graph, node), ATOM),
        ExprNode::Constant(value) => {
            let prec = match value {
                ScalarValue::Rational { .. } => BinaryOp::Div.precedence(),
                _ if value.as_f64() < 0.0 => PREFIX,
                _ => ATOM,
            };
            (value.to_string(), prec)
        }
        ExprNode::Unary { op: UnaryOp::Negate, child } => {
            let (s, p) = part(child);
            // `-3` is the literal; the negation of `3` prints as `-(3)`.
            if p < PREFIX || matches!(graph.node(child), ExprNode::Constant(_)) {
                (format!("-({})", s), PREFIX)
            } else {
                (format!("-{}", s), PREFIX)
            }
        }
        ExprNode::Unary { op, child } => (format!("{}({})", op.name(), part(child).0), ATOM),
        ExprNode::Binary { op, lhs, rhs } => {
            let prec = op.precedence();
            let (ls, lp) = part(lhs);
            let (rs, rp) = part(rhs);
            // `^` groups to the right, everything else to the left. An
            // equal-precedence operand on the other side is always wrapped, so
            // the text parses back to the same tree.
            let wrap_lhs = lp < prec || (op == BinaryOp::Pow && lp <= prec);
            let wrap_rhs = rp < prec || (op != BinaryOp::Pow && rp == prec);
            let l = if wrap_lhs { format!("({})", ls) } else { ls.to_string() };
            let r = if wrap_rhs { format!("({})", rs) } else { rs.to_string() };
            (format!("{} {} {}", l, op.symbol(), r), prec)
        }
    }
}

fn part(done: &[Option<(String, u8)>], id: NodeId) -> (&str, u8) {
    match &done[id.index()] {
        Some((s, p)) => (s.as_str(), *p),
        None => ("?", ATOM),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Component;

    fn vars(g: &mut ExpressionGraph) -> (NodeId, NodeId, NodeId) {
        let leaf = |g: &mut ExpressionGraph, name: &str| {
            let r = g.register_dataset(1, name.as_bytes()).unwrap();
            g.variable_with_alias(r, Component::VALUE, Some(name)).unwrap()
        };
        let a = leaf(g, "a");
        let b = leaf(g, "b");
        let c = leaf(g, "c");
        (a, b, c)
    }

    #[test]
    fn test_parentheses_follow_precedence() {
        let mut g = ExpressionGraph::new();
        let (a, b, c) = vars(&mut g);

        let sum = g.add(a, b);
        let prod = g.mul(sum, c);
        assert_eq!(format_expression(&g, prod), "(a + b) * c");

        let inner = g.sub(b, c);
        let outer = g.sub(a, inner);
        assert_eq!(format_expression(&g, outer), "a - (b - c)");

        let left = g.sub(a, b);
        let chained = g.sub(left, c);
        assert_eq!(format_expression(&g, chained), "a - b - c");

        let neg = g.neg(a);
        let two = g.constant(ScalarValue::Int32(2));
        let sq = g.pow(neg, two);
        assert_eq!(format_expression(&g, sq), "(-a) ^ 2");

        let e = g.exp(sum);
        let l = g.ln(e);
        assert_eq!(format_expression(&g, l), "ln(exp(a + b))");
    }

    #[test]
    fn test_right_operand_of_equal_precedence_is_wrapped() {
        let mut g = ExpressionGraph::new();
        let (a, b, c) = vars(&mut g);

        let m = g.modulo(b, c);
        let root = g.mul(a, m);
        assert_eq!(format_expression(&g, root), "a * (b % c)");

        let q = g.div(b, c);
        let root = g.mul(a, q);
        assert_eq!(format_expression(&g, root), "a * (b / c)");

        let p = g.mul(a, b);
        let root = g.modulo(p, c);
        assert_eq!(format_expression(&g, root), "a * b % c");

        let s = g.add(b, c);
        let root = g.add(a, s);
        assert_eq!(format_expression(&g, root), "a + (b + c)");

        let bc = g.pow(b, c);
        let root = g.pow(a, bc);
        assert_eq!(format_expression(&g, root), "a ^ b ^ c");
    }

    #[test]
    fn test_negative_literals_and_negation() {
        let mut g = ExpressionGraph::new();
        let (a, _, _) = vars(&mut g);
        let three = g.constant(ScalarValue::Int32(3));
        let minus_three = g.constant(ScalarValue::Int32(-3));

        let neg = g.neg(three);
        assert_eq!(format_expression(&g, neg), "-(3)");
        let root = g.mul(a, minus_three);
        assert_eq!(format_expression(&g, root), "a * -3");
        let root = g.pow(minus_three, a);
        assert_eq!(format_expression(&g, root), "(-3) ^ a");

        let two = g.constant(ScalarValue::Float64(2.0));
        let root = g.mul(a, two);
        assert_eq!(format_expression(&g, root), "a * 2.0");
    }

    #[test]
    fn test_aliases_and_bare_variables() {
        let mut g = ExpressionGraph::new();
        let (a, b, _) = vars(&mut g);
        let x = g.add(a, b);
        let y = g.sub(x, b);
        assert_eq!(format_expression(&g, y), "a + b - b");

        g.alias(x, "x");
        assert_eq!(format_expression(&g, y), "x - b");
        assert_eq!(format_expression(&g, x), "a + b");

        let r = g.register_dataset(9, b"z").unwrap();
        let z = g.variable(r, Component::ERROR).unwrap();
        let half = g.constant(ScalarValue::Rational { numer: 1, denom: 2 });
        let root = g.div(z, half);
        assert_eq!(format_expression(&g, root), "d3.error / (1/2)");
    }
}
