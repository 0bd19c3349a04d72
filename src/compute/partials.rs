//! Numeric evaluation and the bottom-up chain-rule pass.
//!
//! Both walk the DAG in post-order, so every node is visited once no matter
//! how often it is shared.

use super::ledger::{PropagationError, ValueSource};
use crate::analysis::topology;
use crate::graph::{BinaryOp, ExprNode, ExpressionGraph, UnaryOp};
use crate::graph::node::sign;
use crate::store::{Component, DatasetRef, DatasetRegistry, NodeId};
use std::collections::btree_map::{self, BTreeMap};

/// A leaf of differentiation: one component of one dataset, by local ref.
pub type LeafKey = (DatasetRef, Component);

/// Sparse map of partial derivatives, one entry per leaf the value depends on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partials {
    terms: BTreeMap<LeafKey, f64>,
}

impl Partials {
    pub fn new() -> Self { Self::default() }

    pub fn unit(leaf: LeafKey) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(leaf, 1.0);
        Self { terms }
    }

    pub fn len(&self) -> usize { self.terms.len() }
    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    /// Partial with respect to `leaf`; zero when the value does not depend on it.
    pub fn get(&self, leaf: LeafKey) -> f64 {
        self.terms.get(&leaf).copied().unwrap_or(0.0)
    }

    pub fn insert(&mut self, leaf: LeafKey, value: f64) {
        self.terms.insert(leaf, value);
    }

    pub fn iter(&self) -> btree_map::Iter<'_, LeafKey, f64> {
        self.terms.iter()
    }

    /// `k * self`.
    pub fn scaled(&self, k: f64) -> Self {
        Self { terms: self.terms.iter().map(|(&leaf, &v)| (leaf, v * k)).collect() }
    }

    /// `ka * a + kb * b`, keeping every leaf present in either side.
    pub fn combine(a: &Self, ka: f64, b: &Self, kb: f64) -> Self {
        let mut terms = BTreeMap::new();
        for (&leaf, &v) in &a.terms {
            terms.insert(leaf, ka * v);
        }
        for (&leaf, &v) in &b.terms {
            *terms.entry(leaf).or_insert(0.0) += kb * v;
        }
        Self { terms }
    }

    /// Rewrites every leaf ref through `remap`. Fails on a ref the map cannot
    /// translate.
    pub fn remap(&self, mut remap: impl FnMut(DatasetRef) -> Option<DatasetRef>) -> Result<Self, PropagationError> {
        let mut terms = BTreeMap::new();
        for (&(dataset, component), &v) in &self.terms {
            let global = remap(dataset).ok_or_else(|| PropagationError::MismatchedRegistry {
                msg: format!("dataset ref {} has no entry in the shared registry", dataset),
            })?;
            terms.insert((global, component), v);
        }
        Ok(Self { terms })
    }
}

impl FromIterator<(LeafKey, f64)> for Partials {
    fn from_iter<I: IntoIterator<Item = (LeafKey, f64)>>(iter: I) -> Self {
        Self { terms: iter.into_iter().collect() }
    }
}

/// Anything that can report partial derivatives of a derived value with
/// respect to the datasets of its own registry.
pub trait PartialSource {
    fn datasets(&self) -> &DatasetRegistry;
    fn partials(&self, values: &dyn ValueSource) -> Result<Partials, PropagationError>;
}

/// Value of a derived quantity together with its partials.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: f64,
    pub partials: Partials,
}

fn lookup(
    graph: &ExpressionGraph,
    values: &dyn ValueSource,
    dataset: DatasetRef,
    component: Component,
) -> Result<f64, PropagationError> {
    let content = graph.dataset_of(dataset).map_err(|e| PropagationError::MismatchedRegistry { msg: e.to_string() })?;
    values.require(content, component)
}

/// Plain numeric evaluation. Domain problems surface as NaN or infinity, never
/// as errors; only missing data fails.
pub fn evaluate(graph: &ExpressionGraph, root: NodeId, values: &dyn ValueSource) -> Result<f64, PropagationError> {
    let order = topology::post_order(graph.arena(), root);
    let mut results = vec![0.0f64; graph.node_count()];

    for &node in &order {
        results[node.index()] = match *graph.node(node) {
            ExprNode::Variable { dataset, component } => lookup(graph, values, dataset, component)?,
            ExprNode::Constant(value) => value.as_f64(),
            ExprNode::Unary { op, child } => op.apply(results[child.index()]),
            ExprNode::Binary { op, lhs, rhs } => op.apply(results[lhs.index()], results[rhs.index()]),
        };
    }

    Ok(results[root.index()])
}

/// Evaluates `root` and its partials with respect to every variable it
/// reaches, applying the chain rule bottom-up.
///
/// Any operator that cannot be differentiated at the supplied values aborts
/// the whole pass.
pub fn differentiate_at(
    graph: &ExpressionGraph,
    root: NodeId,
    values: &dyn ValueSource,
) -> Result<Evaluation, PropagationError> {
    let order = topology::post_order(graph.arena(), root);
    let count = graph.node_count();
    let mut results = vec![0.0f64; count];
    let mut grads: Vec<Partials> = vec![Partials::new(); count];
    // Whether a node's subtree reaches no variable at all.
    let mut constant = vec![false; count];

    for &node in &order {
        let idx = node.index();
        let (value, grad, is_const) = match *graph.node(node) {
            ExprNode::Variable { dataset, component } => {
                let v = lookup(graph, values, dataset, component)?;
                (v, Partials::unit((dataset, component)), false)
            }
            ExprNode::Constant(value) => (value.as_f64(), Partials::new(), true),
            ExprNode::Unary { op, child } => {
                let x = results[child.index()];
                let dx = &grads[child.index()];
                let (v, d) = unary_rule(op, x, dx)?;
                (v, d, constant[child.index()])
            }
            ExprNode::Binary { op, lhs, rhs } => {
                let operands = Operands {
                    x: results[lhs.index()],
                    y: results[rhs.index()],
                    dx: &grads[lhs.index()],
                    dy: &grads[rhs.index()],
                    y_constant: constant[rhs.index()],
                };
                let (v, d) = binary_rule(op, operands)?;
                (v, d, constant[lhs.index()] && constant[rhs.index()])
            }
        };
        results[idx] = value;
        grads[idx] = grad;
        constant[idx] = is_const;
    }

    let idx = root.index();
    Ok(Evaluation { value: results[idx], partials: std::mem::take(&mut grads[idx]) })
}

fn unary_rule(op: UnaryOp, x: f64, dx: &Partials) -> Result<(f64, Partials), PropagationError> {
    let v = op.apply(x);
    let d = match op {
        UnaryOp::Negate => dx.scaled(-1.0),
        // Subgradient 0 at the kink.
        UnaryOp::Abs => dx.scaled(sign(x)),
        // Step function: differentiable almost everywhere, always with slope 0.
        UnaryOp::Sign => Partials::new(),
        UnaryOp::Exp => dx.scaled(v),
        UnaryOp::Ln => {
            if x <= 0.0 {
                return Err(PropagationError::NonDifferentiable(op.into()));
            }
            dx.scaled(1.0 / x)
        }
    };
    Ok((v, d))
}

struct Operands<'a> {
    x: f64,
    y: f64,
    dx: &'a Partials,
    dy: &'a Partials,
    y_constant: bool,
}

fn binary_rule(op: BinaryOp, o: Operands<'_>) -> Result<(f64, Partials), PropagationError> {
    let Operands { x, y, dx, dy, y_constant } = o;
    let v = op.apply(x, y);
    let d = match op {
        BinaryOp::Add => Partials::combine(dx, 1.0, dy, 1.0),
        BinaryOp::Sub => Partials::combine(dx, 1.0, dy, -1.0),
        BinaryOp::Mul => Partials::combine(dx, y, dy, x),
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(PropagationError::NonDifferentiable(op.into()));
            }
            // (dx*y - x*dy) / y^2
            Partials::combine(dx, 1.0 / y, dy, -x / (y * y))
        }
        BinaryOp::Mod => return Err(PropagationError::NonDifferentiable(op.into())),
        BinaryOp::Pow => {
            let base_coef = if dx.is_empty() { 0.0 } else { y * x.powf(y - 1.0) };
            let exp_coef = if x > 0.0 {
                if dy.is_empty() { 0.0 } else { v * x.ln() }
            } else if y_constant {
                0.0
            } else {
                return Err(PropagationError::NonDifferentiable(op.into()));
            };
            if !base_coef.is_finite() || !exp_coef.is_finite() {
                return Err(PropagationError::NonDifferentiable(op.into()));
            }
            Partials::combine(dx, base_coef, dy, exp_coef)
        }
    };
    Ok((v, d))
}
