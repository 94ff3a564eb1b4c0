//! Model-level error taxonomy.
//!
//! # Responsibility
//! - Name every local, immediate failure the model layer can report.
//!
//! # Invariants
//! - Errors are raised synchronously at the call site; nothing is deferred.
//! - Reserved-key errors always carry the offending key.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result alias used across the model layer.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors returned by notebook/cell model operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Metadata namespace collides with a first-class typed field.
    ReservedMetadataKey(String),
    /// Tag is empty or contains a comma.
    InvalidTag(String),
    /// Cell name does not match the nbformat cell id rule.
    InvalidName(String),
    /// Operation attempted on a disposed model.
    Disposed,
    /// Cell index outside of the notebook sequence.
    IndexOutOfRange { index: usize, len: usize },
    /// Value could not be converted to or from JSON.
    Serialization(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReservedMetadataKey(key) => {
                write!(f, "metadata key is reserved for a typed field: `{key}`")
            }
            Self::InvalidTag(value) => write!(f, "invalid tag: `{value}`"),
            Self::InvalidName(value) => write!(f, "invalid cell name: `{value}`"),
            Self::Disposed => write!(f, "model is disposed"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "cell index {index} out of range for length {len}")
            }
            Self::Serialization(details) => write!(f, "serialization failed: {details}"),
        }
    }
}

impl Error for ModelError {}

impl From<serde_json::Error> for ModelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
