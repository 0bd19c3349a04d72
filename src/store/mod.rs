//! Identities of base datasets and the per-token registry that indexes them.
pub mod registry;
pub mod types;

pub use registry::{DatasetRegistry, RegistryError, RegistryUnion};
pub use types::{BaseDataset, Component, DatasetRef, NodeId};
