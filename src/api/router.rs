//! HTTP API router.
//!
//! Everything is nested under `/api/`. Route groups by access level:
//! - public: health, register, login (rate limited only)
//! - signed in: logout, me, scan images (any valid session)
//! - admin: `/admin/*` and `/ai/predict`
//! - patient: `/patient/*` (approved patients only)
//!
//! Middleware stack (outermost → innermost):
//! - public: Extension → rate limit (peer address) → audit → handler
//! - protected: Extension → auth → rate limit (user id) → role gate → audit → handler

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn;
use axum::routing::{get, patch, post};
use axum::{Extension, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Multipart framing allowance on top of the image size limit.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the API router around shared state.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

/// Build router from a pre-constructed `ApiContext` (custom rate limits).
pub fn build_router(ctx: ApiContext) -> Router {
    let body_limit = ctx.core.config.max_upload_bytes + MULTIPART_OVERHEAD;

    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .with_state(ctx.clone())
        .layer(from_fn(middleware::audit::log_access))
        .layer(from_fn(middleware::rate::limit))
        .layer(Extension(ctx.clone()));

    let signed_in = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/auth/me", get(endpoints::auth::me))
        .route("/scans/:id/image", get(endpoints::scans::image))
        .with_state(ctx.clone())
        .layer(from_fn(middleware::audit::log_access))
        .layer(from_fn(middleware::rate::limit))
        .layer(from_fn(middleware::auth::require_auth))
        .layer(Extension(ctx.clone()));

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let admin = Router::new()
        .route("/admin/dashboard", get(endpoints::dashboard::admin))
        .route(
            "/admin/patients",
            get(endpoints::patients::list).post(endpoints::patients::create),
        )
        .route(
            "/admin/patients/:id",
            get(endpoints::patients::detail)
                .put(endpoints::patients::update)
                .delete(endpoints::patients::remove),
        )
        .route(
            "/admin/patients/:id/status",
            patch(endpoints::patients::set_status),
        )
        .route("/admin/patients/:id/scans", get(endpoints::patients::scans))
        .route(
            "/admin/patients/:id/report",
            get(endpoints::report::for_patient),
        )
        .route(
            "/admin/scans",
            get(endpoints::scans::list).post(endpoints::scans::create),
        )
        .route("/ai/predict", post(endpoints::predict::predict))
        .with_state(ctx.clone())
        .layer(from_fn(middleware::audit::log_access))
        .layer(from_fn(middleware::auth::require_admin))
        .layer(from_fn(middleware::rate::limit))
        .layer(from_fn(middleware::auth::require_auth))
        .layer(Extension(ctx.clone()));

    let patient = Router::new()
        .route("/patient/dashboard", get(endpoints::dashboard::patient))
        .route("/patient/scans", get(endpoints::scans::own))
        .route("/patient/report", get(endpoints::report::own))
        .route(
            "/patient/profile",
            get(endpoints::profile::get).put(endpoints::profile::update),
        )
        .with_state(ctx.clone())
        .layer(from_fn(middleware::audit::log_access))
        .layer(from_fn(middleware::auth::require_approved_patient))
        .layer(from_fn(middleware::rate::limit))
        .layer(from_fn(middleware::auth::require_auth))
        .layer(Extension(ctx));

    Router::new()
        .nest("/api", public)
        .nest("/api", signed_in)
        .nest("/api", admin)
        .nest("/api", patient)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
