//! Precomputed per-leaf contributions (schema version 1 payload).

use super::ledger::PropagationError;
use super::partials::{LeafKey, Partials};
use crate::config::FloatWidth;
use crate::graph::ScalarValue;
use crate::store::{Component, DatasetRef, DatasetRegistry};
use std::collections::btree_map::{self, BTreeMap};

/// Mapping from `(dataset ref, moment index)` to the contribution of that
/// leaf, i.e. the partial derivative of the derived value evaluated when the
/// token was written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContributionVector {
    entries: BTreeMap<LeafKey, ScalarValue>,
}

impl ContributionVector {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Inserts a record, returning the value it replaced.
    pub fn insert(&mut self, dataset: DatasetRef, moment: Component, value: ScalarValue) -> Option<ScalarValue> {
        self.entries.insert((dataset, moment), value)
    }

    pub fn get(&self, dataset: DatasetRef, moment: Component) -> Option<&ScalarValue> {
        self.entries.get(&(dataset, moment))
    }

    pub fn iter(&self) -> btree_map::Iter<'_, LeafKey, ScalarValue> {
        self.entries.iter()
    }

    /// Freezes evaluated partials into records of the given float width.
    pub fn from_partials(partials: &Partials, width: FloatWidth) -> Self {
        let entries = partials
            .iter()
            .map(|(&leaf, &v)| {
                let value = match width {
                    FloatWidth::F32 => ScalarValue::Float32(v as f32),
                    FloatWidth::F64 => ScalarValue::Float64(v),
                };
                (leaf, value)
            })
            .collect();
        Self { entries }
    }

    /// The sparse derivative map, validated against the token's registry.
    pub fn to_partials(&self, datasets: &DatasetRegistry) -> Result<Partials, PropagationError> {
        self.entries
            .iter()
            .map(|(&(dataset, moment), value)| {
                if !datasets.contains_ref(dataset) {
                    return Err(PropagationError::MismatchedRegistry {
                        msg: format!("contribution references {} but the registry holds {} datasets", dataset, datasets.count()),
                    });
                }
                Ok(((dataset, moment), value.as_f64()))
            })
            .collect()
    }

    /// Highest dataset ref used, if any.
    pub fn max_ref(&self) -> Option<DatasetRef> {
        self.entries.keys().map(|(r, _)| *r).max()
    }
}
