//! Audit logging middleware.
//!
//! Emits one `audit` target event per request with method, path, response
//! status, and the caller's user id. Runs innermost, after auth has
//! injected `AuthContext`.

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::AuthContext;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let (user_id, role) = req
        .extensions()
        .get::<AuthContext>()
        .map(|a| (a.profile.user_id.to_string(), a.profile.role.as_str()))
        .unwrap_or_else(|| ("anonymous".to_string(), "none"));

    let started = Instant::now();
    let response = next.run(req).await;

    tracing::info!(
        target: "audit",
        method,
        path,
        status = response.status().as_u16(),
        user_id,
        role,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "api access"
    );

    response
}
