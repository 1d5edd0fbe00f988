// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP handlers for the todo API.
//!
//! Handlers translate requests into [`TodoService`] calls. Request bodies are
//! parsed leniently: an empty body or a non-object JSON value is treated as
//! `{}` so that the service reports which field is wrong, and a body that is
//! not JSON at all is a validation failure.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use todo_core::{ListTodosQuery, Todo, TodoError, TodoPage, TodoService};

use crate::config::ServiceInfo;
use crate::error::{ApiError, ErrorBody};

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The todo resource service.
    pub service: TodoService,
    /// Identity reported by health endpoints.
    pub info: Arc<ServiceInfo>,
}

impl AppState {
    /// Create handler state.
    pub fn new(service: TodoService, info: ServiceInfo) -> Self {
        Self {
            service,
            info: Arc::new(info),
        }
    }
}

/// Body of `GET /`.
#[derive(Debug, Serialize)]
pub struct RootResponse {
    /// Always `true`.
    pub ok: bool,
    /// Service name.
    pub service: String,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Service name.
    pub service: String,
    /// Deployed revision, `null` when unknown.
    pub revision: Option<String>,
    /// Environment name.
    pub env: String,
    /// `"connected"` or `"disconnected"`.
    pub database: &'static str,
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        ok: true,
        service: state.info.service.clone(),
    })
}

/// `GET /health` and `GET /api/health`.
///
/// Reports the connection state without touching the store.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if state.service.connection().is_connected() {
        "connected"
    } else {
        "disconnected"
    };

    Json(HealthResponse {
        status: "ok",
        service: state.info.service.clone(),
        revision: state.info.revision.clone(),
        env: state.info.env.clone(),
        database,
    })
}

/// `GET /api/todos`
pub async fn list_todos(
    State(state): State<AppState>,
    query: Result<Query<ListTodosQuery>, QueryRejection>,
) -> Result<Json<TodoPage>, ApiError> {
    let Query(query) = query.map_err(|e| TodoError::validation(e.body_text()))?;
    Ok(Json(state.service.list(query).await?))
}

/// `POST /api/todos`
pub async fn create_todo(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let input = parse_body(&body)?;
    let todo = state.service.create(input).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

/// `GET /api/todos/{id}`
pub async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, ApiError> {
    Ok(Json(state.service.get_one(&id).await?))
}

/// `PATCH /api/todos/{id}`
pub async fn patch_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Todo>, ApiError> {
    let input = parse_body(&body)?;
    Ok(Json(state.service.patch(&id, input).await?))
}

/// `DELETE /api/todos/{id}`
pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fallback for unknown routes and unsupported methods.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            message: "Not found".to_string(),
        }),
    )
}

/// Parse a request body into `T`.
fn parse_body<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|_| TodoError::validation("Malformed JSON body"))?;

    match value {
        Value::Object(_) => serde_json::from_value(value)
            .map_err(|e| ApiError(TodoError::validation(e.to_string()))),
        _ => Ok(T::default()),
    }
}
