//! Python extension surface, compiled only with the `python` feature.
pub mod python;
