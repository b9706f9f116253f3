//! Bearer token authentication and role gates.
//!
//! `require_auth` extracts `Authorization: Bearer <token>`, resolves the
//! session to a profile, and injects `AuthContext` into request extensions.
//! `require_admin` and `require_approved_patient` run after it on the
//! route groups that need them.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::auth;
use crate::models::enums::{ApprovalStatus, Role};

/// Extract the bearer token, if any.
pub fn bearer_token<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require a valid session token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?.to_string();

    // Connection dropped here, before any .await
    let profile = {
        let conn = ctx.core.open_db()?;
        auth::authenticate(&conn, &token)?
    };

    req.extensions_mut().insert(AuthContext { profile, token });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}

fn caller<B>(req: &Request<B>) -> Result<&AuthContext, ApiError> {
    req.extensions()
        .get::<AuthContext>()
        .ok_or(ApiError::Unauthorized)
}

/// Admin-only routes. Non-admins get 403.
pub async fn require_admin(req: Request<axum::body::Body>, next: Next) -> Response {
    let allowed = caller(&req).and_then(|auth| {
        if auth.profile.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin access required".into()))
        }
    });
    match allowed {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// Patient data routes. The caller must be a patient in `approved` state;
/// other states get 403 naming the status.
pub async fn require_approved_patient(req: Request<axum::body::Body>, next: Next) -> Response {
    let allowed = caller(&req).and_then(|auth| match (auth.profile.role, auth.profile.status) {
        (Role::Patient, ApprovalStatus::Approved) => Ok(()),
        (Role::Patient, status) => Err(ApiError::AccountNotApproved(status.to_string())),
        (Role::Admin, _) => Err(ApiError::Forbidden("Patient access only".into())),
    });
    match allowed {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn bearer_token_parsing() {
        let req = Request::builder()
            .header("Authorization", "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), Some("abc123"));

        let req = Request::builder()
            .header("Authorization", "Basic abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), None);

        let req = Request::builder()
            .header("Authorization", "Bearer   ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), None);
    }
}
