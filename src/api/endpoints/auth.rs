//! Registration, sign-in and session endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, AuthContext};
use crate::auth;
use crate::models::Profile;
use crate::patients::{self, Registration};

#[derive(Serialize)]
pub struct RegisterResponse {
    pub profile: Profile,
    pub message: &'static str,
}

/// `POST /api/auth/register`: public sign-up. The account starts pending.
pub async fn register(
    State(ctx): State<ApiContext>,
    ApiJson(body): ApiJson<Registration>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let core = ctx.core.clone();
    let profile = tokio::task::spawn_blocking(move || -> Result<Profile, ApiError> {
        let mut conn = core.open_db()?;
        Ok(patients::register(&mut conn, &body, core.config.password_iterations)?)
    })
    .await??;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            profile,
            message: "Registration received. An administrator will review your account.",
        }),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    pub profile: Profile,
}

/// `POST /api/auth/login`: exchange credentials for a session token.
pub async fn login(
    State(ctx): State<ApiContext>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = body
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Email is required".into()))?;
    let password = body
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Password is required".into()))?;

    let core = ctx.core.clone();
    let session = tokio::task::spawn_blocking(move || -> Result<auth::IssuedSession, ApiError> {
        let conn = core.open_db()?;
        Ok(auth::login(
            &conn,
            &email,
            &password,
            core.config.session_ttl,
            core.config.password_iterations,
        )?)
    })
    .await??;

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        profile: session.profile,
    }))
}

/// `POST /api/auth/logout`: end the current session.
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    auth::logout(&conn, &caller.token)?;
    tracing::info!(user_id = %caller.profile.user_id, "Session closed");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`: the caller's own profile, whatever its status.
pub async fn me(Extension(caller): Extension<AuthContext>) -> Json<Profile> {
    Json(caller.profile)
}
