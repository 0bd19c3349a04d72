use super::types::*;
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use thiserror::Error;

/// Longest fingerprint representable by the one-byte wire length.
pub const MAX_HASH_LEN: usize = u8::MAX as usize;
/// Largest number of datasets a single token can reference.
pub const MAX_DATASETS: usize = u16::MAX as usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Dataset hash of {0} bytes exceeds the {MAX_HASH_LEN} byte limit")]
    HashTooLong(usize),
    #[error("Registry is full ({MAX_DATASETS} datasets)")]
    Full,
    #[error("Dataset ref {index} out of bounds for {count} datasets")]
    InvalidReference { index: u16, count: usize },
}

/// Ordered, content-deduplicated list of the base datasets a token references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRegistry {
    entries: Vec<BaseDataset>,

    // Ephemeral lookup for content dedup (Not serialized, rebuilt on load)
    #[serde(skip)]
    lookup: HashMap<BaseDataset, DatasetRef>,
}

impl DatasetRegistry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Rebuilds the content lookup after deserialization.
    pub fn rebuild_lookup(&mut self) {
        self.lookup = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, d)| (d.clone(), DatasetRef(i as u16)))
            .collect();
    }

    /// Returns the ref of an identical dataset if one is present, otherwise
    /// appends a new entry.
    pub fn register(&mut self, hash_type: u16, hash_bytes: &[u8]) -> Result<DatasetRef, RegistryError> {
        self.register_dataset(BaseDataset::new(hash_type, hash_bytes))
    }

    pub fn register_dataset(&mut self, dataset: BaseDataset) -> Result<DatasetRef, RegistryError> {
        if dataset.hash_bytes.len() > MAX_HASH_LEN {
            return Err(RegistryError::HashTooLong(dataset.hash_bytes.len()));
        }
        if let Some(&existing) = self.lookup.get(&dataset) {
            return Ok(existing);
        }
        if self.entries.len() >= MAX_DATASETS {
            return Err(RegistryError::Full);
        }

        let id = DatasetRef(self.entries.len() as u16);
        self.lookup.insert(dataset.clone(), id);
        self.entries.push(dataset);
        Ok(id)
    }

    pub fn resolve(&self, dataset_ref: DatasetRef) -> Result<&BaseDataset, RegistryError> {
        self.entries
            .get(dataset_ref.index())
            .ok_or(RegistryError::InvalidReference { index: dataset_ref.0, count: self.entries.len() })
    }

    pub fn find(&self, dataset: &BaseDataset) -> Option<DatasetRef> {
        self.lookup.get(dataset).copied()
    }

    pub fn contains_ref(&self, dataset_ref: DatasetRef) -> bool {
        dataset_ref.index() < self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DatasetRef, &BaseDataset)> {
        self.entries.iter().enumerate().map(|(i, d)| (DatasetRef(i as u16), d))
    }

    pub fn datasets(&self) -> &[BaseDataset] { &self.entries }
}

/// Shared dataset space for a group of registries being combined.
///
/// Built once before any cross-token computation and immutable afterwards.
/// `remap(token, local)` translates a token-local ref into the global space.
#[derive(Debug, Clone, Default)]
pub struct RegistryUnion {
    global: DatasetRegistry,
    tables: Vec<Vec<DatasetRef>>,
}

impl RegistryUnion {
    pub fn build<'a>(registries: impl IntoIterator<Item = &'a DatasetRegistry>) -> Result<Self, RegistryError> {
        let mut global = DatasetRegistry::new();
        let mut tables = Vec::new();

        for registry in registries {
            let mut table = Vec::with_capacity(registry.count());
            for dataset in registry.datasets() {
                table.push(global.register_dataset(dataset.clone())?);
            }
            tables.push(table);
        }

        Ok(Self { global, tables })
    }

    pub fn global(&self) -> &DatasetRegistry { &self.global }

    pub fn remap(&self, member: usize, local: DatasetRef) -> Option<DatasetRef> {
        self.tables.get(member)?.get(local.index()).copied()
    }
}
