//! Error taxonomy for catalog mutations.

use super::models::EntityKind;
use thiserror::Error;

/// Errors returned by catalog operations.
///
/// A failed operation never leaves partial state behind: every check runs
/// before the first row is touched, so the store is exactly as it was
/// before the call. All variants are recoverable by the caller; none is
/// retried internally.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A uniqueness constraint would be violated.
    #[error("{entity} with {field} '{value}' already exists")]
    DuplicateKey {
        entity: EntityKind,
        field: &'static str,
        value: String,
    },

    /// A referenced row does not exist.
    #[error("referenced {entity} {id} does not exist")]
    ForeignKeyViolation { entity: EntityKind, id: i64 },

    /// A delete is blocked by a dependent row under a RESTRICT policy.
    /// `dependent_key` names the first blocking row in the deterministic
    /// scan order (tables in global order, ascending by key).
    #[error("cannot delete {entity} {id}: referenced by {dependent} {dependent_key}")]
    ReferentialViolation {
        entity: EntityKind,
        id: i64,
        dependent: EntityKind,
        dependent_key: String,
    },

    /// A domain check on a field value failed.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },

    /// The target row of an update or delete does not exist.
    #[error("{entity} {key} not found")]
    NotFound { entity: EntityKind, key: String },

    /// Backend storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl CatalogError {
    pub(crate) fn not_found(entity: EntityKind, key: impl ToString) -> Self {
        CatalogError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
