//! Scan recording: image validation, storage in the upload directory, and
//! the scan row itself.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use uuid::Uuid;

use crate::classifier::{normalize_confidence, suggestion_for};
use crate::db::{self, DatabaseError};
use crate::models::enums::DrGrade;
use crate::models::ScanResult;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Image is empty")]
    EmptyImage,
    #[error("Image is {size} bytes, limit is {max}")]
    ImageTooLarge { size: usize, max: usize },
    #[error("Image must be JPEG or PNG")]
    UnsupportedImage,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Image storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Detect the image format from magic bytes.
pub fn detect_image_kind(bytes: &[u8]) -> Option<ImageKind> {
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        Some(ImageKind::Jpeg)
    } else if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
    {
        Some(ImageKind::Png)
    } else {
        None
    }
}

/// Non-empty, within `max_bytes`, JPEG or PNG.
pub fn validate_image(bytes: &[u8], max_bytes: usize) -> Result<ImageKind, ScanError> {
    if bytes.is_empty() {
        return Err(ScanError::EmptyImage);
    }
    if bytes.len() > max_bytes {
        return Err(ScanError::ImageTooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }
    detect_image_kind(bytes).ok_or(ScanError::UnsupportedImage)
}

/// Parse a form confidence value into [0, 1]. Accepts a trailing `%`.
pub fn parse_confidence(raw: &str) -> Result<f64, ScanError> {
    let value: f64 = raw
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse()
        .map_err(|_| ScanError::InvalidInput(format!("Confidence is not a number: {raw}")))?;
    normalize_confidence(value)
        .ok_or_else(|| ScanError::InvalidInput(format!("Confidence out of range: {raw}")))
}

/// Canonical label for storage: a known grade's display label, or the
/// trimmed input verbatim.
pub fn canonical_label(raw: &str) -> Result<String, ScanError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ScanError::InvalidInput("Prediction is required".into()));
    }
    Ok(DrGrade::from_label(trimmed)
        .map(|g| g.label().to_string())
        .unwrap_or_else(|| trimmed.to_string()))
}

pub fn image_url(scan_id: &Uuid) -> String {
    format!("/api/scans/{scan_id}/image")
}

/// A validated scan waiting to be stored.
#[derive(Debug, Clone)]
pub struct NewScan {
    pub patient_id: Uuid,
    pub image: Vec<u8>,
    pub prediction: String,
    pub confidence: f64,
    pub manual_suggestion: Option<String>,
}

/// Write the image under a fresh UUID name and insert the scan row.
/// The file is removed again if the insert fails.
pub fn save_scan(
    conn: &Connection,
    uploads_dir: &Path,
    new_scan: NewScan,
    max_image_bytes: usize,
    created_by: Option<Uuid>,
) -> Result<ScanResult, ScanError> {
    let kind = validate_image(&new_scan.image, max_image_bytes)?;
    let prediction = canonical_label(&new_scan.prediction)?;
    let confidence = normalize_confidence(new_scan.confidence).ok_or_else(|| {
        ScanError::InvalidInput(format!("Confidence out of range: {}", new_scan.confidence))
    })?;
    db::get_patient(conn, &new_scan.patient_id)?;

    let id = Uuid::new_v4();
    let file_name = format!("{id}.{}", kind.extension());
    let path = uploads_dir.join(&file_name);
    std::fs::write(&path, &new_scan.image)?;

    let now = db::now_timestamp();
    let scan = ScanResult {
        id,
        patient_id: new_scan.patient_id,
        image_url: image_url(&id),
        image_path: file_name,
        suggestion: suggestion_for(&prediction).to_string(),
        prediction,
        confidence,
        manual_suggestion: new_scan
            .manual_suggestion
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        created_by,
        created_at: now.clone(),
        updated_at: now,
    };

    if let Err(e) = db::insert_scan(conn, &scan) {
        remove_image_files(uploads_dir, std::slice::from_ref(&scan.image_path));
        return Err(e.into());
    }

    tracing::info!(
        scan_id = %scan.id,
        patient_id = %scan.patient_id,
        prediction = %scan.prediction,
        "Scan recorded"
    );
    Ok(scan)
}

/// Resolve a stored file name inside the upload directory. Names carrying
/// path components are refused.
pub fn stored_image_path(uploads_dir: &Path, file_name: &str) -> Option<PathBuf> {
    let name = Path::new(file_name);
    match name.file_name() {
        Some(base) if base == name.as_os_str() => Some(uploads_dir.join(name)),
        _ => None,
    }
}

/// Best-effort removal of stored images. Failures are logged, not returned.
pub fn remove_image_files(uploads_dir: &Path, file_names: &[String]) {
    for file_name in file_names {
        let Some(path) = stored_image_path(uploads_dir, file_name) else {
            tracing::warn!(file_name, "Refusing to remove image outside upload directory");
            continue;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), "Failed to remove image: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_account, NewAccount};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{ApprovalStatus, Role};

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

    fn patient(conn: &mut Connection) -> Uuid {
        create_account(
            conn,
            &NewAccount {
                email: "ana@example.com".into(),
                password: "password-1".into(),
                full_name: "Ana Silva".into(),
                role: Role::Patient,
                status: ApprovalStatus::Approved,
                phone: None,
                date_of_birth: None,
                gender: None,
                address: None,
            },
            1_000,
        )
        .unwrap()
        .id
    }

    fn new_scan(patient_id: Uuid, image: &[u8]) -> NewScan {
        NewScan {
            patient_id,
            image: image.to_vec(),
            prediction: "moderate".into(),
            confidence: 0.8,
            manual_suggestion: None,
        }
    }

    #[test]
    fn detect_jpeg_and_png() {
        assert_eq!(detect_image_kind(JPEG), Some(ImageKind::Jpeg));
        assert_eq!(detect_image_kind(PNG), Some(ImageKind::Png));
        assert_eq!(detect_image_kind(b"%PDF-1.4"), None);
        assert_eq!(detect_image_kind(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn validate_image_rules() {
        assert!(matches!(validate_image(&[], 100), Err(ScanError::EmptyImage)));
        assert!(matches!(
            validate_image(JPEG, 4),
            Err(ScanError::ImageTooLarge { size: 10, max: 4 })
        ));
        assert!(matches!(
            validate_image(b"GIF89a....", 100),
            Err(ScanError::UnsupportedImage)
        ));
        assert_eq!(validate_image(PNG, 100).unwrap(), ImageKind::Png);
    }

    #[test]
    fn confidence_parsing() {
        assert_eq!(parse_confidence("0.75").unwrap(), 0.75);
        assert_eq!(parse_confidence(" 75 ").unwrap(), 0.75);
        assert_eq!(parse_confidence("92%").unwrap(), 0.92);
        assert!(parse_confidence("abc").is_err());
        assert!(parse_confidence("-1").is_err());
        assert!(parse_confidence("250").is_err());
    }

    #[test]
    fn canonical_labels() {
        assert_eq!(canonical_label("no_dr").unwrap(), "No DR");
        assert_eq!(canonical_label(" Glaucoma ").unwrap(), "Glaucoma");
        assert!(canonical_label("  ").is_err());
    }

    #[test]
    fn save_scan_writes_file_and_row() {
        let tmp = tempfile::tempdir().unwrap();
        let mut conn = open_memory_database().unwrap();
        let patient_id = patient(&mut conn);

        let scan = save_scan(&conn, tmp.path(), new_scan(patient_id, JPEG), 1024, None).unwrap();
        assert_eq!(scan.prediction, "Moderate");
        assert_eq!(scan.suggestion, suggestion_for("Moderate"));
        assert_eq!(scan.image_url, format!("/api/scans/{}/image", scan.id));
        assert!(scan.image_path.ends_with(".jpg"));

        let stored = std::fs::read(tmp.path().join(&scan.image_path)).unwrap();
        assert_eq!(stored, JPEG);
        assert!(db::get_scan(&conn, &scan.id).unwrap().is_some());
    }

    #[test]
    fn save_scan_keeps_manual_suggestion() {
        let tmp = tempfile::tempdir().unwrap();
        let mut conn = open_memory_database().unwrap();
        let patient_id = patient(&mut conn);

        let mut input = new_scan(patient_id, PNG);
        input.manual_suggestion = Some("  Recheck in 2 weeks ".into());
        let scan = save_scan(&conn, tmp.path(), input, 1024, None).unwrap();
        assert_eq!(scan.effective_suggestion(), "Recheck in 2 weeks");
    }

    #[test]
    fn save_scan_unknown_patient_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();

        let err = save_scan(&conn, tmp.path(), new_scan(Uuid::new_v4(), JPEG), 1024, None).unwrap_err();
        assert!(matches!(err, ScanError::Database(DatabaseError::NotFound { .. })));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn stored_path_rejects_traversal() {
        let dir = Path::new("/data/uploads");
        assert_eq!(
            stored_image_path(dir, "abc.jpg"),
            Some(PathBuf::from("/data/uploads/abc.jpg"))
        );
        assert!(stored_image_path(dir, "../retina.db").is_none());
        assert!(stored_image_path(dir, "sub/abc.jpg").is_none());
    }

    #[test]
    fn remove_image_files_ignores_missing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.jpg"), JPEG).unwrap();
        remove_image_files(tmp.path(), &["a.jpg".into(), "missing.png".into()]);
        assert!(!tmp.path().join("a.jpg").exists());
    }
}
