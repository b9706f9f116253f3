//! Scan endpoints: admin upload and listing, patient history, image serving.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::endpoints::patients::parse_id;
use crate::api::error::ApiError;
use crate::api::extract::ApiQuery;
use crate::api::types::{ApiContext, AuthContext, PageParams};
use crate::db;
use crate::models::enums::{ApprovalStatus, Role};
use crate::models::{ScanResult, ScanWithPatient};
use crate::scans::{self, NewScan};

/// An uploaded file pulled out of a multipart body.
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Fields of the scan upload form.
#[derive(Default)]
struct ScanForm {
    patient_id: Option<String>,
    image: Option<UploadedImage>,
    prediction: Option<String>,
    confidence: Option<String>,
    suggestion: Option<String>,
}

async fn read_scan_form(mut multipart: Multipart) -> Result<ScanForm, ApiError> {
    let mut form = ScanForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("scan").to_string();
                let bytes = field.bytes().await?.to_vec();
                form.image = Some(UploadedImage { bytes, file_name });
            }
            "patient_id" => form.patient_id = Some(field.text().await?),
            "prediction" => form.prediction = Some(field.text().await?),
            "confidence" => form.confidence = Some(field.text().await?),
            "suggestion" => form.suggestion = Some(field.text().await?),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }
    Ok(form)
}

/// Pull the `image` field out of a multipart body.
pub async fn read_image_field(mut multipart: Multipart) -> Result<UploadedImage, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let file_name = field.file_name().unwrap_or("scan").to_string();
            let bytes = field.bytes().await?.to_vec();
            return Ok(UploadedImage { bytes, file_name });
        }
    }
    Err(ApiError::BadRequest("Image is required".into()))
}

fn required(value: Option<String>, what: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{what} is required")))
}

/// `POST /api/admin/scans`: multipart: patient_id, image, prediction,
/// confidence, optional suggestion override.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ScanResult>), ApiError> {
    let form = read_scan_form(multipart).await?;

    let patient_id = parse_id(required(form.patient_id, "patient_id")?.trim())?;
    let image = form
        .image
        .ok_or_else(|| ApiError::BadRequest("Image is required".into()))?;
    let prediction = required(form.prediction, "prediction")?;
    let confidence = scans::parse_confidence(&required(form.confidence, "confidence")?)?;

    let conn = ctx.core.open_db()?;
    let scan = scans::save_scan(
        &conn,
        &ctx.core.uploads_dir(),
        NewScan {
            patient_id,
            image: image.bytes,
            prediction,
            confidence,
            manual_suggestion: form.suggestion,
        },
        ctx.core.config.max_upload_bytes,
        Some(caller.profile.id),
    )?;

    Ok((StatusCode::CREATED, Json(scan)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub patient_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct ScanList {
    pub scans: Vec<ScanWithPatient>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// `GET /api/admin/scans?patient_id=&page=&limit=`
pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<ScanList>, ApiError> {
    let patient_id = query
        .patient_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_id)
        .transpose()?;
    let paging = PageParams {
        page: query.page,
        limit: query.limit,
    };

    let conn = ctx.core.open_db()?;
    let (scans, total) =
        db::list_scans(&conn, patient_id.as_ref(), paging.limit(), paging.offset())?;

    Ok(Json(ScanList {
        scans,
        total,
        page: paging.page(),
        limit: paging.limit(),
    }))
}

/// `GET /api/patient/scans`: the caller's own history, newest first.
pub async fn own(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<Json<Vec<ScanResult>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(db::get_scans_for_patient(&conn, &caller.profile.id, None)?))
}

/// `GET /api/scans/:id/image`: admins, or the approved patient who owns the scan.
pub async fn image(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let scan = {
        let conn = ctx.core.open_db()?;
        db::get_scan(&conn, &id)?.ok_or_else(|| ApiError::NotFound("Scan not found".into()))?
    };

    let profile = &caller.profile;
    match profile.role {
        Role::Admin => {}
        Role::Patient if profile.id != scan.patient_id => {
            // Same answer as a missing scan, so ids cannot be enumerated.
            return Err(ApiError::NotFound("Scan not found".into()));
        }
        Role::Patient if profile.status != ApprovalStatus::Approved => {
            return Err(ApiError::AccountNotApproved(profile.status.to_string()));
        }
        Role::Patient => {}
    }

    let path = scans::stored_image_path(&ctx.core.uploads_dir(), &scan.image_path)
        .ok_or_else(|| ApiError::Internal(format!("bad stored image name for scan {id}")))?;
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound("Image file missing".into())
        } else {
            ApiError::Internal(e.to_string())
        }
    })?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CACHE_CONTROL, "private, no-store")
        .body(Body::from(bytes))
        .map_err(|e| ApiError::Internal(e.to_string()))
}
