//! propagate.rs
//! Correlation-aware error propagation over independent base datasets.
//!
//! `Cov(T_i, T_j) = Σ_k ∂T_i/∂l_k · ∂T_j/∂l_k · Var(l_k)`, where the `l_k`
//! are value components of base datasets and `Var(l_k)` is the square of the
//! dataset's error component.

use super::ledger::{PropagationError, ValueSource};
use super::partials::{PartialSource, Partials};
use crate::config::PropagationSettings;
use crate::store::{Component, DatasetRef, RegistryUnion};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Symmetric covariance matrix over the sources of one request, in request
/// order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CovarianceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl CovarianceMatrix {
    fn zeros(size: usize) -> Self {
        Self { size, values: vec![0.0; size * size] }
    }

    fn set(&mut self, i: usize, j: usize, v: f64) {
        self.values[i * self.size + j] = v;
        self.values[j * self.size + i] = v;
    }

    pub fn size(&self) -> usize { self.size }
    pub fn get(&self, i: usize, j: usize) -> f64 { self.values[i * self.size + j] }
    pub fn variance(&self, i: usize) -> f64 { self.get(i, i) }

    /// Pearson correlation, `None` when either side has zero variance.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let denom = (self.variance(i) * self.variance(j)).sqrt();
        if denom == 0.0 {
            return None;
        }
        Some(self.get(i, j) / denom)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.size.max(1))
    }
}

/// Runs propagation requests against one set of supplied component values.
pub struct Propagator<'a> {
    values: &'a dyn ValueSource,
    settings: PropagationSettings,
}

impl<'a> Propagator<'a> {
    pub fn new(values: &'a dyn ValueSource) -> Self {
        Self::with_settings(values, PropagationSettings::default())
    }

    pub fn with_settings(values: &'a dyn ValueSource, settings: PropagationSettings) -> Self {
        Self { values, settings }
    }

    /// Partials of a single source, keyed by its own local refs.
    pub fn partials<T: PartialSource + ?Sized>(&self, source: &T) -> Result<Partials, PropagationError> {
        source.partials(self.values)
    }

    pub fn variance<T: PartialSource + Sync + ?Sized>(&self, source: &T) -> Result<f64, PropagationError> {
        Ok(self.covariance(&[source])?.variance(0))
    }

    /// Full covariance matrix of `sources`.
    ///
    /// Registries are unioned once up front; every source's partials are then
    /// rewritten into the shared dataset space before any product is formed.
    /// The first failing source aborts the whole request.
    pub fn covariance<T: PartialSource + Sync + ?Sized>(&self, sources: &[&T]) -> Result<CovarianceMatrix, PropagationError> {
        let union = RegistryUnion::build(sources.iter().map(|s| s.datasets()))
            .map_err(|e| PropagationError::MismatchedRegistry { msg: e.to_string() })?;

        let globalize = |(member, source): (usize, &&T)| -> Result<Partials, PropagationError> {
            let local = source.partials(self.values)?;
            local.remap(|r| union.remap(member, r))
        };
        let partials: Vec<Partials> = if self.settings.parallel {
            sources.par_iter().enumerate().map(globalize).collect::<Result<_, _>>()?
        } else {
            sources.iter().enumerate().map(globalize).collect::<Result<_, _>>()?
        };

        let variances = self.leaf_variances(&union, &partials)?;

        let n = sources.len();
        let mut matrix = CovarianceMatrix::zeros(n);
        for i in 0..n {
            for j in i..n {
                let cov = variances
                    .iter()
                    .map(|(&leaf, &var)| {
                        let key = (leaf, Component::VALUE);
                        partials[i].get(key) * partials[j].get(key) * var
                    })
                    .sum();
                matrix.set(i, j, cov);
            }
        }

        tracing::debug!(
            sources = n,
            datasets = union.global().count(),
            leaves = variances.len(),
            parallel = self.settings.parallel,
            "Propagated covariance"
        );
        Ok(matrix)
    }

    /// `error²` for every value leaf that some source actually depends on.
    fn leaf_variances(&self, union: &RegistryUnion, partials: &[Partials]) -> Result<BTreeMap<DatasetRef, f64>, PropagationError> {
        let mut variances = BTreeMap::new();
        for p in partials {
            for (&(leaf, component), &d) in p.iter() {
                if component != Component::VALUE || d == 0.0 || variances.contains_key(&leaf) {
                    continue;
                }
                let dataset = union
                    .global()
                    .resolve(leaf)
                    .map_err(|e| PropagationError::MismatchedRegistry { msg: e.to_string() })?;
                let error = self.values.require(dataset, Component::ERROR)?;
                variances.insert(leaf, error * error);
            }
        }
        Ok(variances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Token, TokenBuilder};
    use crate::compute::Ledger;
    use crate::config::FloatWidth;
    use crate::store::BaseDataset;

    fn a() -> BaseDataset { BaseDataset::new(1, b"a".to_vec()) }
    fn b() -> BaseDataset { BaseDataset::new(1, b"b".to_vec()) }

    fn ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.insert_measurement(a(), 10.0, 2.0);
        ledger.insert_measurement(b(), 5.0, 3.0);
        ledger
    }

    /// x = a + b, y = x - b
    fn motivating() -> (Token, Token) {
        let mut builder = TokenBuilder::new();
        let a = builder.dataset(1, b"a", Some("a")).unwrap();
        let b = builder.dataset(1, b"b", Some("b")).unwrap();
        let x = builder.add(a, b);
        let y = builder.sub(x, b);
        (builder.token(x).unwrap(), builder.token(y).unwrap())
    }

    #[test]
    fn test_motivating_case() {
        let ledger = ledger();
        let propagator = Propagator::new(&ledger);
        let (x, y) = motivating();

        assert_eq!(propagator.variance(&y).unwrap(), 4.0);
        assert_eq!(propagator.variance(&x).unwrap(), 13.0);

        let cov = propagator.covariance(&[&x, &y]).unwrap();
        assert_eq!(cov.get(0, 1), 4.0);
        assert_eq!(cov.get(1, 0), 4.0);
        assert_eq!(cov.variance(1), 4.0);
        assert!((cov.correlation(0, 1).unwrap() - 4.0 / (13.0f64 * 4.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_anti_correlation() {
        let ledger = ledger();
        let propagator = Propagator::new(&ledger);

        let mut builder = TokenBuilder::new();
        let a = builder.dataset(1, b"a", None).unwrap();
        let b = builder.dataset(1, b"b", None).unwrap();
        let p = builder.sub(a, b);
        let q = builder.sub(b, a);
        let sum = builder.add(p, q);

        let p = builder.token(p).unwrap();
        let q = builder.token(q).unwrap();
        let sum = builder.token(sum).unwrap();

        let cov = propagator.covariance(&[&p, &q]).unwrap();
        assert_eq!(cov.variance(0), 13.0);
        assert_eq!(cov.get(0, 1), -13.0);
        assert_eq!(cov.correlation(0, 1), Some(-1.0));
        assert_eq!(propagator.variance(&sum).unwrap(), 0.0);
    }

    #[test]
    fn test_mod_aborts_request() {
        let ledger = ledger();
        let mut builder = TokenBuilder::new();
        let a = builder.dataset(1, b"a", None).unwrap();
        let three = builder.integer(3);
        let m = builder.modulo(a, three);
        let ok = builder.token(a).unwrap();
        let bad = builder.token(m).unwrap();

        let err = Propagator::new(&ledger).covariance(&[&ok, &bad]).unwrap_err();
        assert_eq!(err, PropagationError::NonDifferentiable(crate::graph::BinaryOp::Mod.into()));
    }

    #[test]
    fn test_zero_partial_needs_no_error() {
        let mut ledger = Ledger::new();
        ledger.insert_measurement(a(), 10.0, 2.0);
        ledger.insert(b(), Component::VALUE, 5.0);
        let propagator = Propagator::new(&ledger);
        let (x, y) = motivating();

        assert_eq!(propagator.variance(&y).unwrap(), 4.0);
        assert_eq!(
            propagator.variance(&x).unwrap_err(),
            PropagationError::MissingComponent { dataset: b(), component: Component::ERROR }
        );
    }

    #[test]
    fn test_contribution_tokens_across_registries() {
        let ledger = ledger();
        let propagator = Propagator::new(&ledger);

        // Opposite registration orders: local refs disagree between tokens.
        let mut first = TokenBuilder::new();
        let b1 = first.dataset(1, b"b", None).unwrap();
        let a1 = first.dataset(1, b"a", None).unwrap();
        let two = first.integer(2);
        let scaled = first.mul(two, b1);
        let x = first.add(scaled, a1);
        let x = first.token(x).unwrap();

        let mut second = TokenBuilder::new();
        let a2 = second.dataset(1, b"a", None).unwrap();
        let b2 = second.dataset(1, b"b", None).unwrap();
        let y = second.sub(a2, b2);
        let y = second.token(y).unwrap();
        assert_ne!(x.datasets().datasets()[0], y.datasets().datasets()[0]);

        let x1 = Token::decode(&x.to_contributions(&ledger, FloatWidth::F64).unwrap().encode()).unwrap();
        let y1 = Token::decode(&y.to_contributions(&ledger, FloatWidth::F64).unwrap().encode()).unwrap();

        let trees = propagator.covariance(&[&x, &y]).unwrap();
        let vectors = propagator.covariance(&[&x1, &y1]).unwrap();
        let mixed = propagator.covariance(&[&x1, &y]).unwrap();
        assert_eq!(trees, vectors);
        assert_eq!(trees, mixed);
        // Cov = 1*1*4 + 2*(-1)*9
        assert_eq!(trees.get(0, 1), -14.0);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let ledger = ledger();
        let (x, y) = motivating();
        let parallel = Propagator::new(&ledger).covariance(&[&x, &y]).unwrap();
        let sequential = Propagator::with_settings(&ledger, PropagationSettings { parallel: false })
            .covariance(&[&x, &y])
            .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_exact_components_carry_no_variance() {
        let mut ledger = ledger();
        ledger.insert(a(), Component::DOMAIN, 100.0);

        let mut builder = TokenBuilder::new();
        let value = builder.dataset(1, b"a", None).unwrap();
        let domain = builder.component(1, b"a", Component::DOMAIN, None).unwrap();
        let root = builder.div(value, domain);
        let token = builder.token(root).unwrap();

        // d/da (a / D) = 1/D; D is exact.
        let var = Propagator::new(&ledger).variance(&token).unwrap();
        assert!((var - 4.0 / 10_000.0).abs() < 1e-15);
    }
}
