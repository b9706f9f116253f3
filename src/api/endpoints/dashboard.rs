//! Dashboard endpoints.

use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::dashboard::{self, AdminDashboard, PatientDashboard};

/// `GET /api/admin/dashboard`
pub async fn admin(State(ctx): State<ApiContext>) -> Result<Json<AdminDashboard>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(dashboard::admin_dashboard(&conn, chrono::Utc::now())?))
}

/// `GET /api/patient/dashboard`
pub async fn patient(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<Json<PatientDashboard>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(dashboard::patient_dashboard(&conn, &caller.profile.id)?))
}
