// BookVerse - Book sharing platform storage layer
// Copyright (C) 2025 BookVerse contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Error types for BookVerse storage
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by what went wrong with the data (integrity), with the
//! schema (index declaration, migrations), or with the caller's input.
//!
//! ## Integrity errors
//! Raised by the storage engine itself and surfaced unmodified:
//! - UNIQUE constraint / unique index → `UniqueViolation`
//! - FOREIGN KEY constraint → `ForeignKeyViolation`
//! - CHECK / NOT NULL constraint → `ConstraintViolation`
//! - write to an append-only collection → `ImmutableRecord`
//!
//! ## Schema errors
//! - conflicting index declaration → `IndexConflict`
//! - index build rejected by existing data → `IndexBuildFailed`
//! - relational migration failure → `MigrationFailed`
//!
//! None of these are transient; there is no retry policy.

use thiserror::Error;

/// Result type alias using our BookverseError type
pub type Result<T> = std::result::Result<T, BookverseError>;

/// Message prefix raised by the append-only triggers on document collections.
pub(crate) const IMMUTABLE_MARKER: &str = "append-only collection";

/// Main error type for the BookVerse storage layer
#[derive(Error, Debug)]
pub enum BookverseError {
    // ===== Integrity Errors =====

    /// Duplicate key on a unique column or unique index (e.g. user email)
    #[error("Uniqueness violation: {0}")]
    UniqueViolation(String),

    /// Reference to a row/document that does not exist (e.g. `addedBy`)
    #[error("Referential integrity violation: {0}")]
    ForeignKeyViolation(String),

    /// CHECK or NOT NULL constraint failed (e.g. status outside the enumeration)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Attempted update or delete of an immutable record
    #[error("Record is immutable: {0}")]
    ImmutableRecord(String),

    // ===== Workflow Errors =====

    /// Unknown book status string
    #[error("Invalid book status: {0}")]
    InvalidStatus(String),

    /// Moderation transition not allowed by the status workflow
    #[error("Invalid status transition for book {book_id}: {from} -> {to}")]
    InvalidTransition {
        book_id: String,
        from: String,
        to: String,
    },

    // ===== Schema Errors =====

    /// An index with the same name or key pattern but a different definition exists
    #[error("Index conflict on {collection}.{index}: {reason}")]
    IndexConflict {
        collection: String,
        index: String,
        reason: String,
    },

    /// Building an index failed (typically duplicate keys under a new unique index)
    #[error("Failed to build index {collection}.{index}: {reason}")]
    IndexBuildFailed {
        collection: String,
        index: String,
        reason: String,
    },

    /// Collection is not known to the store
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    // ===== Data/Input Errors =====

    /// Database record not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Stored data could not be decoded into its model
    #[error("Invalid data: {0}")]
    InvalidData(String),

    // ===== Configuration Errors =====

    /// Configuration file or value error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    // ===== External Library Errors =====

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx (non-integrity)
    #[error("Database error: {0}")]
    SqlxError(#[source] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sqlx::Error> for BookverseError {
    /// Integrity failures reported by SQLite become their taxonomy variant;
    /// everything else stays a driver error.
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        let sqlx::Error::Database(db_err) = &err else {
            return BookverseError::SqlxError(err);
        };

        let message = db_err.message().to_string();
        if message.starts_with(IMMUTABLE_MARKER) {
            return BookverseError::ImmutableRecord(message);
        }

        match db_err.kind() {
            ErrorKind::UniqueViolation => BookverseError::UniqueViolation(message),
            ErrorKind::ForeignKeyViolation => BookverseError::ForeignKeyViolation(message),
            ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                BookverseError::ConstraintViolation(message)
            }
            _ => BookverseError::SqlxError(err),
        }
    }
}

impl From<url::ParseError> for BookverseError {
    fn from(err: url::ParseError) -> Self {
        BookverseError::ConfigurationError(format!("Invalid connection string: {}", err))
    }
}

// Helper methods for creating common errors
impl BookverseError {
    /// Create a RecordNotFound error with a resource name
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        BookverseError::RecordNotFound(resource.into())
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        BookverseError::InvalidInput(message.into())
    }

    /// Create an IndexConflict error
    pub fn index_conflict<C, I, R>(collection: C, index: I, reason: R) -> Self
    where
        C: Into<String>,
        I: Into<String>,
        R: Into<String>,
    {
        BookverseError::IndexConflict {
            collection: collection.into(),
            index: index.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is a data-integrity failure raised by the storage engine
    ///
    /// These are never retried: the same write will fail the same way.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            BookverseError::UniqueViolation(_)
                | BookverseError::ForeignKeyViolation(_)
                | BookverseError::ConstraintViolation(_)
                | BookverseError::ImmutableRecord(_)
        )
    }

    /// Check if error comes from declaring the schema (fatal at startup)
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            BookverseError::IndexConflict { .. }
                | BookverseError::IndexBuildFailed { .. }
                | BookverseError::MigrationFailed(_)
        )
    }

    /// Get a message suitable for returning to an API client
    pub fn user_message(&self) -> String {
        match self {
            BookverseError::UniqueViolation(_) => {
                "A record with the same unique value already exists.".to_string()
            }
            BookverseError::ForeignKeyViolation(_) => {
                "The referenced user or book does not exist.".to_string()
            }
            BookverseError::InvalidStatus(status) => {
                format!(
                    "'{}' is not a valid status. Use pending, approved or rejected.",
                    status
                )
            }
            BookverseError::InvalidTransition { from, to, .. } => {
                format!("A {} book cannot be marked {}.", from, to)
            }
            BookverseError::ImmutableRecord(_) => {
                "Download history cannot be changed.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_classification() {
        assert!(BookverseError::UniqueViolation("users.email".into()).is_integrity_error());
        assert!(BookverseError::ImmutableRecord("downloads".into()).is_integrity_error());
        assert!(!BookverseError::not_found("book 1").is_integrity_error());
    }

    #[test]
    fn test_schema_classification() {
        let err = BookverseError::index_conflict("users", "email_1", "unique flag differs");
        assert!(err.is_schema_error());
        assert!(!err.is_integrity_error());
        assert_eq!(
            err.to_string(),
            "Index conflict on users.email_1: unique flag differs"
        );
    }

    #[test]
    fn test_user_message_for_transition() {
        let err = BookverseError::InvalidTransition {
            book_id: "7".into(),
            from: "approved".into(),
            to: "rejected".into(),
        };
        assert_eq!(err.user_message(), "A approved book cannot be marked rejected.");
    }

    #[test]
    fn test_non_database_sqlx_error_is_passed_through() {
        let err: BookverseError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, BookverseError::SqlxError(_)));
    }
}
