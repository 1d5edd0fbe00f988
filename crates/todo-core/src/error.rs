// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for todo-core.
//!
//! [`TodoError`] is the result taxonomy of the record store and the resource
//! service. Transports map each variant to a response through
//! [`TodoError::error_code`]; only [`TodoError::public_message`] is meant to
//! leave the process.

use thiserror::Error;

/// Result type using [`TodoError`].
pub type Result<T> = std::result::Result<T, TodoError>;

/// Errors produced by todo operations.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TodoError {
    /// Caller-supplied input failed validation.
    #[error("{message}")]
    Validation {
        /// Human readable reason, safe to return to the caller.
        message: String,
    },

    /// The referenced todo does not exist.
    #[error("Todo '{id}' not found")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// No store connection is active right now.
    #[error("Store unavailable: no active connection")]
    StoreUnavailable,

    /// The store rejected or failed an otherwise valid operation.
    #[error("Store error during '{operation}': {details}")]
    StoreOperation {
        /// The operation that failed.
        operation: String,
        /// Driver level details. Logged, never exposed.
        details: String,
    },
}

impl TodoError {
    /// Build a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build a not-found error for the given id.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Stable error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::StoreOperation { .. } => "STORE_OPERATION_ERROR",
        }
    }

    /// Message that may be shown to a client.
    ///
    /// Store failures collapse to an opaque message.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation { message } => message.clone(),
            Self::NotFound { .. } => "Not found".to_string(),
            Self::StoreUnavailable => {
                "Service temporarily unavailable, try again later".to_string()
            }
            Self::StoreOperation { .. } => "Internal Server Error".to_string(),
        }
    }
}

impl From<sqlx::Error> for TodoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => TodoError::StoreUnavailable,
            other => TodoError::StoreOperation {
                operation: "query".to_string(),
                details: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let cases = vec![
            (TodoError::validation("bad"), "VALIDATION_ERROR"),
            (TodoError::not_found("abc"), "NOT_FOUND"),
            (TodoError::StoreUnavailable, "STORE_UNAVAILABLE"),
            (
                TodoError::StoreOperation {
                    operation: "insert".to_string(),
                    details: "constraint".to_string(),
                },
                "STORE_OPERATION_ERROR",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.error_code(), expected, "wrong code for {:?}", error);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TodoError::validation("title is required (string)").to_string(),
            "title is required (string)"
        );
        assert_eq!(
            TodoError::not_found("abc-123").to_string(),
            "Todo 'abc-123' not found"
        );
        assert_eq!(
            TodoError::StoreOperation {
                operation: "insert".to_string(),
                details: "connection reset".to_string(),
            }
            .to_string(),
            "Store error during 'insert': connection reset"
        );
    }

    #[test]
    fn test_store_operation_details_stay_private() {
        let err = TodoError::StoreOperation {
            operation: "update".to_string(),
            details: "relation \"todos\" does not exist".to_string(),
        };
        assert_eq!(err.public_message(), "Internal Server Error");
        assert_eq!(TodoError::not_found("x").public_message(), "Not found");
    }

    #[test]
    fn test_from_sqlx_error() {
        let err: TodoError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, TodoError::StoreOperation { .. }));

        let err: TodoError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, TodoError::StoreUnavailable));
    }
}
