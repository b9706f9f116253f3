//! Patient self-service profile endpoints.

use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, AuthContext};
use crate::db;
use crate::models::{Profile, ProfileChanges};
use crate::patients;

/// `GET /api/patient/profile`: re-read so the response reflects recent edits.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<Json<Profile>, ApiError> {
    let conn = ctx.core.open_db()?;
    let profile = db::get_profile(&conn, &caller.profile.id)?
        .ok_or_else(|| ApiError::NotFound("Profile not found".into()))?;
    Ok(Json(profile))
}

/// `PUT /api/patient/profile`: name and contact fields. Email is fixed.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    ApiJson(changes): ApiJson<ProfileChanges>,
) -> Result<Json<Profile>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(patients::update_own_profile(&conn, &caller.profile, changes)?))
}
