//! Structural walks and summaries over the expression DAG.
pub mod telemetry;
pub mod topology;

pub use telemetry::ExpressionStats;
pub use topology::post_order;
