//! Data Correlation Tokens: portable records of how a derived value was
//! computed from base datasets, and correlation-aware error propagation over
//! them.

pub mod analysis;
pub mod codec;
pub mod compute;
pub mod config;
pub mod display;
pub mod graph;
pub mod store;

#[cfg(feature = "python")]
pub mod bindings;

pub use codec::{FormatError, SchemaVersion, Token, TokenBuilder};
pub use compute::{CovarianceMatrix, Ledger, PropagationError, Propagator};
pub use config::Settings;
pub use display::ParseError;
pub use graph::Pattern;
pub use store::{BaseDataset, Component, DatasetRef};

#[cfg(feature = "python")]
use pyo3::prelude::*;

// --- Module Definition ---
/// Defines the `_core` Python module.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    bindings::python::register(m)
}
