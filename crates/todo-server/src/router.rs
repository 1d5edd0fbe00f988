// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route table and middleware stack.

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::panic_response;
use crate::handlers::{self, AppState};

/// Build the application router.
///
/// | Method | Path | Handler |
/// |--------|------|---------|
/// | GET | `/` | [`handlers::root`] |
/// | GET | `/health`, `/api/health` | [`handlers::health`] |
/// | GET, POST | `/api/todos` | list, create |
/// | GET, PATCH, DELETE | `/api/todos/{id}` | get, patch, delete |
///
/// Anything else answers 404 `{message: "Not found"}`.
pub fn router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::health))
        .route(
            "/api/todos",
            get(handlers::list_todos).post(handlers::create_todo),
        )
        .route(
            "/api/todos/{id}",
            get(handlers::get_todo)
                .patch(handlers::patch_todo)
                .delete(handlers::delete_todo),
        )
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_allowed_origins))
}

/// CORS policy: an empty origin list mirrors any request origin, otherwise
/// only listed origins receive CORS headers.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
