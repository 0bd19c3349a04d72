//! Binary and text forms of the Data Correlation Token.
pub mod builder;
pub mod error;
pub mod token;
pub mod wire;

pub use builder::TokenBuilder;
pub use error::FormatError;
pub use token::{Payload, SchemaVersion, Token, TOKEN_PREFIX};
