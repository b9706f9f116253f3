//! Admin patient management endpoints.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::api::types::{ApiContext, PageParams};
use crate::db::{self, PatientFilter};
use crate::models::enums::ApprovalStatus;
use crate::models::{Profile, ProfileChanges, ScanResult};
use crate::patients::{self, PatientDetail, PatientInput, PatientUpsert};

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid id: {raw}")))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct PatientList {
    pub patients: Vec<Profile>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// `GET /api/admin/patients?search=&status=&page=&limit=`
pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<PatientList>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            ApprovalStatus::from_str(&s.to_lowercase())
                .map_err(|_| ApiError::BadRequest(format!("Unknown status: {s}")))
        })
        .transpose()?;

    let paging = PageParams {
        page: query.page,
        limit: query.limit,
    };
    let conn = ctx.core.open_db()?;
    let (patients, total) = db::list_patients(
        &conn,
        &PatientFilter {
            search: query.search,
            status,
            limit: paging.limit(),
            offset: paging.offset(),
        },
    )?;

    Ok(Json(PatientList {
        patients,
        total,
        page: paging.page(),
        limit: paging.limit(),
    }))
}

/// `POST /api/admin/patients`: create, or convert an existing patient
/// with the same email (200 with `converted: true`).
pub async fn create(
    State(ctx): State<ApiContext>,
    ApiJson(body): ApiJson<PatientInput>,
) -> Result<(StatusCode, Json<PatientUpsert>), ApiError> {
    let core = ctx.core.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<PatientUpsert, ApiError> {
        let mut conn = core.open_db()?;
        Ok(patients::create_or_convert(
            &mut conn,
            &body,
            core.config.password_iterations,
        )?)
    })
    .await??;

    let status = if result.converted {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(result)))
}

/// `GET /api/admin/patients/:id`: profile plus scan count.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<PatientDetail>, ApiError> {
    let id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(patients::patient_detail(&conn, &id)?))
}

/// `PUT /api/admin/patients/:id`: partial update of name and contact fields.
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    ApiJson(changes): ApiJson<ProfileChanges>,
) -> Result<Json<Profile>, ApiError> {
    let id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(patients::update_patient(&conn, &id, &changes)?))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

/// `PATCH /api/admin/patients/:id/status`
pub async fn set_status(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<Json<Profile>, ApiError> {
    let id = parse_id(&id)?;
    let raw = body
        .status
        .ok_or_else(|| ApiError::BadRequest("Status is required".into()))?;
    let status = ApprovalStatus::from_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Unknown status: {raw}")))?;

    let conn = ctx.core.open_db()?;
    Ok(Json(patients::set_status(&conn, &id, status)?))
}

/// `DELETE /api/admin/patients/:id`: patient, scans, images, sessions, identity.
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let mut conn = ctx.core.open_db()?;
    patients::delete_patient(&mut conn, &ctx.core.uploads_dir(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/admin/patients/:id/scans`: one patient's full history.
pub async fn scans(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ScanResult>>, ApiError> {
    let id = parse_id(&id)?;
    let conn = ctx.core.open_db()?;
    db::get_patient(&conn, &id)?;
    Ok(Json(db::get_scans_for_patient(&conn, &id, None)?))
}
