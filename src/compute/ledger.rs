use crate::graph::Operator;
use crate::store::{BaseDataset, Component};
use smallvec::SmallVec;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropagationError {
    #[error("Cannot propagate through {0}")]
    NonDifferentiable(Operator),
    #[error("Registry mismatch: {msg}")]
    MismatchedRegistry { msg: String },
    #[error("Dataset {dataset} has no {component} component")]
    MissingComponent { dataset: BaseDataset, component: Component },
    #[error("Token carries precomputed contributions, not an expression")]
    NotAnExpression,
}

/// Read access to the numeric facets of base datasets.
pub trait ValueSource: Sync {
    fn value(&self, dataset: &BaseDataset, component: Component) -> Option<f64>;

    fn require(&self, dataset: &BaseDataset, component: Component) -> Result<f64, PropagationError> {
        self.value(dataset, component).ok_or_else(|| PropagationError::MissingComponent {
            dataset: dataset.clone(),
            component,
        })
    }
}

/// Component values of the base datasets taking part in a propagation.
///
/// Errors are stored as standard deviations, as in the datasets themselves.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    values: HashMap<BaseDataset, SmallVec<[(Component, f64); 4]>>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn insert(&mut self, dataset: BaseDataset, component: Component, value: f64) {
        let slots = self.values.entry(dataset).or_default();
        match slots.iter_mut().find(|(c, _)| *c == component) {
            Some(slot) => slot.1 = value,
            None => slots.push((component, value)),
        }
    }

    /// Records the value and standard deviation of a dataset.
    pub fn insert_measurement(&mut self, dataset: BaseDataset, value: f64, error: f64) {
        self.insert(dataset.clone(), Component::VALUE, value);
        self.insert(dataset, Component::ERROR, error);
    }

    pub fn get(&self, dataset: &BaseDataset, component: Component) -> Option<f64> {
        self.values
            .get(dataset)?
            .iter()
            .find(|(c, _)| *c == component)
            .map(|(_, v)| *v)
    }
}

impl ValueSource for Ledger {
    fn value(&self, dataset: &BaseDataset, component: Component) -> Option<f64> {
        self.get(dataset, component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_overwrites_component() {
        let d = BaseDataset::new(1, vec![1, 2]);
        let mut ledger = Ledger::new();
        ledger.insert_measurement(d.clone(), 10.0, 2.0);
        ledger.insert(d.clone(), Component::ERROR, 3.0);

        assert_eq!(ledger.get(&d, Component::VALUE), Some(10.0));
        assert_eq!(ledger.get(&d, Component::ERROR), Some(3.0));
        assert_eq!(ledger.get(&d, Component::THIRD_MOMENT), None);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_require_reports_missing_component() {
        let d = BaseDataset::new(1, vec![0xab]);
        let mut ledger = Ledger::new();
        ledger.insert(d.clone(), Component::VALUE, 1.0);

        let err = ledger.require(&d, Component::ERROR).unwrap_err();
        assert_eq!(err, PropagationError::MissingComponent { dataset: d, component: Component::ERROR });
        assert_eq!(err.to_string(), "Dataset 1:ab has no error component");
    }
}
