//! Evaluation, differentiation and covariance propagation.
pub mod contribution;
pub mod ledger;
pub mod partials;
pub mod propagate;
pub mod symbolic;

pub use contribution::ContributionVector;
pub use ledger::{Ledger, PropagationError, ValueSource};
pub use partials::{differentiate_at, evaluate, Evaluation, LeafKey, PartialSource, Partials};
pub use propagate::{CovarianceMatrix, Propagator};
pub use symbolic::differentiate;
