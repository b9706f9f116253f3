//! PDF report download endpoints.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Extension;
use uuid::Uuid;

use crate::api::endpoints::patients::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::report::{self, PatientReport};

async fn render(ctx: &ApiContext, patient_id: Uuid) -> Result<Response, ApiError> {
    let core = ctx.core.clone();
    let today = chrono::Utc::now().date_naive();
    let report = tokio::task::spawn_blocking(move || -> Result<PatientReport, ApiError> {
        let conn = core.open_db()?;
        Ok(report::build_patient_report(&conn, &patient_id, today)?)
    })
    .await??;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", report.file_name),
        )
        .body(Body::from(report.bytes))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// `GET /api/patient/report`: the caller's own report.
pub async fn own(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    render(&ctx, caller.profile.id).await
}

/// `GET /api/admin/patients/:id/report`
pub async fn for_patient(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    render(&ctx, id).await
}
