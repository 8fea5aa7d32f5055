//! Errors reported by association handles.

use relmodel_core::Error;
use std::fmt;
use std::sync::Arc;

/// Error stored on (and returned by) an [`Association`](crate::Association).
///
/// Cloneable so the sticky error can be handed out again on every later
/// call; executor errors are shared behind an `Arc` for that reason.
#[derive(Debug, Clone)]
pub enum AssociationError {
    /// The owner model declares no relationship with this name.
    UnresolvedRelationship { model: &'static str, name: String },
    /// The owner model's relationship declarations are invalid.
    Schema(String),
    /// A value (or find target) is not of the relationship's related type.
    UnsupportedDataType {
        found: &'static str,
        relation: &'static str,
    },
    /// Number of input values differs from the number of owners.
    LengthMismatch { owners: usize, values: usize },
    /// The executor (or a model field accessor) reported an error.
    Execution(Arc<Error>),
    /// An operation was cancelled or panicked part way through.
    Aborted(String),
}

impl AssociationError {
    /// The underlying storage error, if this is an execution failure.
    pub fn execution(&self) -> Option<&Error> {
        match self {
            AssociationError::Execution(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_length_mismatch(&self) -> bool {
        matches!(self, AssociationError::LengthMismatch { .. })
    }

    pub fn is_unsupported_data_type(&self) -> bool {
        matches!(self, AssociationError::UnsupportedDataType { .. })
    }
}

impl fmt::Display for AssociationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationError::UnresolvedRelationship { model, name } => {
                write!(f, "unsupported relations: {} on model {}", name, model)
            }
            AssociationError::Schema(msg) => write!(f, "schema error: {}", msg),
            AssociationError::UnsupportedDataType { found, relation } => {
                write!(f, "unsupported data type: {} for relation {}", found, relation)
            }
            AssociationError::LengthMismatch { .. } => {
                write!(f, "invalid association values, length doesn't match")
            }
            AssociationError::Execution(err) => write!(f, "{}", err),
            AssociationError::Aborted(reason) => {
                write!(f, "association operation aborted: {}", reason)
            }
        }
    }
}

impl std::error::Error for AssociationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssociationError::Execution(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<Error> for AssociationError {
    fn from(err: Error) -> Self {
        AssociationError::Execution(Arc::new(err))
    }
}
