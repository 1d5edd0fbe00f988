// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP error responses.
//!
//! | Error | Status | Body |
//! |-------|--------|------|
//! | `Validation` | 400 | `{message: <reason>}` |
//! | `NotFound` | 404 | `{message: "Not found"}` |
//! | `StoreUnavailable` | 503 | `{message: "Service temporarily unavailable, try again later"}` |
//! | `StoreOperation` | 500 | `{message: "Internal Server Error"}` |

use std::any::Any;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use todo_core::TodoError;
use tracing::{debug, error, warn};

/// Generic body for unexpected failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Client-facing message.
    pub message: String,
}

/// A [`TodoError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TodoError);

impl From<TodoError> for ApiError {
    fn from(err: TodoError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status code for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TodoError::Validation { .. } => StatusCode::BAD_REQUEST,
            TodoError::NotFound { .. } => StatusCode::NOT_FOUND,
            TodoError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.error_code();

        match status {
            StatusCode::INTERNAL_SERVER_ERROR => error!(code, error = %self.0, "Request failed"),
            StatusCode::SERVICE_UNAVAILABLE => warn!(code, "Request rejected, store unavailable"),
            _ => debug!(code, error = %self.0, "Request rejected"),
        }

        let body = ErrorBody {
            message: self.0.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Response for a panic caught in a handler.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(details = %details, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: INTERNAL_ERROR_MESSAGE.to_string(),
        }),
    )
        .into_response()
}
