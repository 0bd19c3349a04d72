use crate::graph::{ExprNode, ExpressionGraph};
use crate::store::NodeId;
use std::collections::HashMap;
use std::fmt::Write;

/// Indented dump of the DAG under `target`. A node reached a second time is
/// printed as a back-reference to the level where it was first expanded.
pub fn format_trace(graph: &ExpressionGraph, target: NodeId) -> String {
    let mut output = String::new();
    if target.index() >= graph.node_count() {
        let _ = writeln!(output, "Error: Invalid Node ID {:?}", target);
        return output;
    }

    let _ = writeln!(output, "TRACE for '{}' {}:", label(graph, target), graph.hash(target));
    let _ = writeln!(output, "--------------------------------------------------");

    let mut tracer = Tracer { graph, first_seen: HashMap::new(), output };
    tracer.run(target);
    tracer.output
}

/// Display name of a node: its alias, `d<ref>.<component>` for a bare
/// variable, the literal for a constant, otherwise its short hash.
pub(crate) fn label(graph: &ExpressionGraph, id: NodeId) -> String {
    if let Some(alias) = graph.print_alias(id) {
        return alias.to_string();
    }
    match *graph.node(id) {
        ExprNode::Variable { dataset, component } => format!("{}.{}", dataset, component),
        ExprNode::Constant(value) => value.to_string(),
        _ => format!("#{}", graph.hash(id).short_hex()),
    }
}

struct Tracer<'a> {
    graph: &'a ExpressionGraph,
    first_seen: HashMap<NodeId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn run(&mut self, target: NodeId) {
        // (node, level, prefix); explicit so deep chains cannot overflow.
        let mut stack: Vec<(NodeId, usize, String)> = vec![(target, 1, String::new())];

        while let Some((node, level, prefix)) = stack.pop() {
            if let Some(&first) = self.first_seen.get(&node) {
                let _ = writeln!(self.output, "{}{} -> (Ref to L{})", prefix, label(self.graph, node), first);
                continue;
            }
            self.first_seen.insert(node, level);

            let header = format!("[L{}] {}", level, label(self.graph, node));
            let kind = *self.graph.node(node);
            match kind {
                ExprNode::Variable { dataset, component } => {
                    let content = self
                        .graph
                        .dataset_of(dataset)
                        .map(|d| d.to_string())
                        .unwrap_or_else(|_| "?".into());
                    let _ = writeln!(self.output, "{}{} -> Var({} {})", prefix, header, content, component);
                }
                ExprNode::Constant(value) => {
                    let _ = writeln!(self.output, "{}{} -> Const({:?})", prefix, header, value.value_type());
                }
                ExprNode::Unary { op, child } => {
                    let _ = writeln!(self.output, "{}{} = {}({})", prefix, header, op.name(), label(self.graph, child));
                }
                ExprNode::Binary { op, lhs, rhs } => {
                    let _ = writeln!(
                        self.output,
                        "{}{} = {} {} {}",
                        prefix,
                        header,
                        label(self.graph, lhs),
                        op.symbol(),
                        label(self.graph, rhs)
                    );
                }
            }

            let children = kind.children();
            let stem = build_child_stem(&prefix);
            for (i, &child) in children.iter().enumerate().rev() {
                let connector = if i == children.len() - 1 { "`--" } else { "|--" };
                stack.push((child, level + 1, format!("{}{}", stem, connector)));
            }
        }
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Component;

    #[test]
    fn test_trace_marks_shared_nodes() {
        let mut g = ExpressionGraph::new();
        let ra = g.register_dataset(1, b"a").unwrap();
        let rb = g.register_dataset(1, b"b").unwrap();
        let a = g.variable_with_alias(ra, Component::VALUE, Some("a")).unwrap();
        let b = g.variable_with_alias(rb, Component::VALUE, Some("b")).unwrap();
        let x = g.add(a, b);
        g.alias(x, "x");
        let y = g.sub(x, b);
        g.alias(y, "y");

        let trace = format_trace(&g, y);
        let lines: Vec<&str> = trace.lines().collect();
        assert!(lines[0].starts_with("TRACE for 'y' #"));
        assert_eq!(
            &lines[2..],
            &[
                "[L1] y = x - b",
                "|--[L2] x = a + b",
                "|  |--[L3] a -> Var(1:61 value)",
                "|  `--[L3] b -> Var(1:62 value)",
                "`--b -> (Ref to L3)",
            ]
        );
    }

    #[test]
    fn test_trace_unaliased_nodes() {
        let mut g = ExpressionGraph::new();
        let r = g.register_dataset(2, &[0xAB]).unwrap();
        let v = g.variable(r, Component::ERROR).unwrap();
        let c = g.constant(crate::graph::ScalarValue::Int32(3));
        let root = g.mul(v, c);

        let trace = format_trace(&g, root);
        assert!(trace.contains("[L2] d0.error -> Var(2:ab error)"));
        assert!(trace.contains("[L2] 3 -> Const(Int32)"));
        assert!(trace.contains("= d0.error * 3"));
    }

    #[test]
    fn test_trace_invalid_id() {
        let g = ExpressionGraph::new();
        assert!(format_trace(&g, NodeId(7)).starts_with("Error: Invalid Node ID"));
    }
}
