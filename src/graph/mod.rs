//! Defines the expression DAG: node model, canonical hashing, the
//! hash-consed arena and wildcard patterns over it.
pub mod arena;
pub mod dag;
pub mod hash;
pub mod node;
pub mod pattern;

// Re-export key types for convenient access
pub use arena::ExprArena;
pub use dag::ExpressionGraph;
pub use hash::{Blake3Hasher, NodeHash, NodeHasher};
pub use node::{BinaryOp, ExprNode, NodeMetadata, Operator, ScalarValue, UnaryOp, ValueType};
pub use pattern::{Bindings, Pattern};
