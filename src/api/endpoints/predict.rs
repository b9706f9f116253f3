//! Fundus image prediction, forwarded to the configured classifier.

use axum::extract::{Multipart, State};
use axum::Json;

use crate::api::endpoints::scans::read_image_field;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::classifier::{ClassifierError, ImageUpload, Prediction};
use crate::scans;

/// `POST /api/ai/predict`: multipart with one `image` field.
///
/// Returns the classifier's grade and confidence plus the matching
/// suggestion. Nothing is stored; the admin saves the scan separately.
pub async fn predict(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<Prediction>, ApiError> {
    let classifier = ctx.core.classifier();
    if !classifier.is_configured() {
        return Err(ClassifierError::NotConfigured.into());
    }

    let upload = read_image_field(multipart).await?;
    let kind = scans::validate_image(&upload.bytes, ctx.core.config.max_upload_bytes)?;
    let image = ImageUpload {
        bytes: upload.bytes,
        file_name: upload.file_name,
        content_type: kind.mime_type().to_string(),
    };

    let prediction = tokio::task::spawn_blocking(move || classifier.classify(&image)).await??;
    tracing::info!(
        prediction = %prediction.prediction,
        confidence = prediction.confidence,
        "Prediction served"
    );
    Ok(Json(prediction))
}
