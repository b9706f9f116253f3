//! One-page A4 PDF summary of a patient's retina screening.

use std::io::BufWriter;

use chrono::NaiveDate;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{Profile, ScanResult};

/// Previous scans listed under the latest one.
pub const HISTORY_ROWS: usize = 10;

pub const DISCLAIMER: &str = "This report is generated from an automated screening model and \
     is not a diagnosis. Results must be reviewed by a qualified eye care professional.";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("No scan on record for patient {0}")]
    NoScans(Uuid),
    #[error("PDF rendering failed: {0}")]
    Pdf(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Rendered report ready to send.
pub struct PatientReport {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Load a patient's scans and render the report.
pub fn build_patient_report(
    conn: &Connection,
    patient_id: &Uuid,
    generated_on: NaiveDate,
) -> Result<PatientReport, ReportError> {
    let patient = db::get_patient(conn, patient_id)?;
    let scans = db::get_scans_for_patient(conn, patient_id, Some(HISTORY_ROWS as u32 + 1))?;
    if scans.is_empty() {
        return Err(ReportError::NoScans(*patient_id));
    }

    let bytes = render_report(&patient, &scans, generated_on)?;
    tracing::info!(patient_id = %patient_id, scans = scans.len(), "Report rendered");
    Ok(PatientReport {
        file_name: report_file_name(&patient.full_name, generated_on),
        bytes,
    })
}

/// `retina_report_<name>_<YYYY-MM-DD>.pdf`, with the name reduced to
/// ASCII alphanumerics and underscores.
pub fn report_file_name(full_name: &str, generated_on: NaiveDate) -> String {
    let mut name = String::new();
    for c in full_name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') && !name.is_empty() {
            name.push('_');
        }
    }
    let name = name.trim_end_matches('_');
    let name = if name.is_empty() { "patient" } else { name };
    format!("retina_report_{name}_{}.pdf", generated_on.format("%Y-%m-%d"))
}

fn pdf_err(e: impl std::fmt::Display) -> ReportError {
    ReportError::Pdf(e.to_string())
}

/// Render the report. `scans` must be newest first; the first is the latest.
pub fn render_report(
    patient: &Profile,
    scans: &[ScanResult],
    generated_on: NaiveDate,
) -> Result<Vec<u8>, ReportError> {
    let (latest, previous) = scans
        .split_first()
        .ok_or(ReportError::NoScans(patient.id))?;

    let title = "Retina Screening Report";
    let (doc, page1, layer1) = PdfDocument::new(title, Mm(210.0), Mm(297.0), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?;
    let courier = doc.add_builtin_font(BuiltinFont::Courier).map_err(pdf_err)?;

    let mut y = Mm(280.0);

    layer.use_text(title, 16.0, Mm(20.0), y, &bold);
    y -= Mm(6.0);
    layer.use_text(
        format!("Generated: {}", generated_on.format("%Y-%m-%d")),
        9.0,
        Mm(20.0),
        y,
        &font,
    );
    y -= Mm(10.0);

    // Patient
    layer.use_text("PATIENT", 11.0, Mm(20.0), y, &bold);
    y -= Mm(6.0);
    let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    for (label, value) in [
        ("Name", patient.full_name.clone()),
        ("Email", patient.email.clone()),
        ("Phone", dash(&patient.phone)),
        ("Date of birth", dash(&patient.date_of_birth)),
        ("Gender", dash(&patient.gender)),
        ("Address", dash(&patient.address)),
    ] {
        layer.use_text(format!("{label}: {value}"), 9.0, Mm(25.0), y, &font);
        y -= Mm(4.5);
    }
    y -= Mm(6.0);

    // Latest scan
    layer.use_text("LATEST SCAN", 11.0, Mm(20.0), y, &bold);
    y -= Mm(6.0);
    for line in [
        format!("Date: {}", scan_date(latest)),
        format!("Prediction: {}", latest.prediction),
        format!("Confidence: {}", confidence_percent(latest.confidence)),
    ] {
        layer.use_text(line, 9.0, Mm(25.0), y, &font);
        y -= Mm(4.5);
    }
    layer.use_text("Recommendation:", 9.0, Mm(25.0), y, &bold);
    y -= Mm(4.5);
    for line in wrap_text(latest.effective_suggestion(), 90) {
        layer.use_text(&line, 9.0, Mm(25.0), y, &font);
        y -= Mm(4.5);
    }
    y -= Mm(6.0);

    // History
    if !previous.is_empty() {
        layer.use_text("PREVIOUS SCANS", 11.0, Mm(20.0), y, &bold);
        y -= Mm(6.0);
        layer.use_text(
            format!("{:<12} {:<20} {:>10}", "Date", "Prediction", "Confidence"),
            8.0,
            Mm(25.0),
            y,
            &courier,
        );
        y -= Mm(4.0);
        for scan in previous.iter().take(HISTORY_ROWS) {
            let row = format!(
                "{:<12} {:<20} {:>10}",
                scan_date(scan),
                truncate(&scan.prediction, 20),
                confidence_percent(scan.confidence)
            );
            layer.use_text(&row, 8.0, Mm(25.0), y, &courier);
            y -= Mm(4.0);
        }
    }

    // Disclaimer pinned to the page foot
    let mut foot = Mm(25.0);
    for line in wrap_text(DISCLAIMER, 100) {
        layer.use_text(&line, 7.5, Mm(20.0), foot, &font);
        foot -= Mm(3.5);
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(pdf_err)?;
    buf.into_inner().map_err(pdf_err)
}

fn scan_date(scan: &ScanResult) -> &str {
    scan.created_at.get(..10).unwrap_or(&scan.created_at)
}

fn confidence_percent(confidence: f64) -> String {
    format!("{:.1}%", confidence * 100.0)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_account, NewAccount};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{ApprovalStatus, Role};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn patient(conn: &mut Connection) -> Profile {
        create_account(
            conn,
            &NewAccount {
                email: "ana@example.com".into(),
                password: "password-1".into(),
                full_name: "Ana María Silva".into(),
                role: Role::Patient,
                status: ApprovalStatus::Approved,
                phone: Some("555-0100".into()),
                date_of_birth: Some("1970-04-02".into()),
                gender: None,
                address: None,
            },
            1_000,
        )
        .unwrap()
    }

    fn scan(patient_id: Uuid, prediction: &str, created_at: &str, manual: Option<&str>) -> ScanResult {
        ScanResult {
            id: Uuid::new_v4(),
            patient_id,
            image_url: String::new(),
            image_path: format!("{}.jpg", Uuid::new_v4()),
            prediction: prediction.into(),
            confidence: 0.873,
            suggestion: "Auto suggestion text.".into(),
            manual_suggestion: manual.map(String::from),
            created_by: None,
            created_at: created_at.into(),
            updated_at: created_at.into(),
        }
    }

    #[test]
    fn file_name_is_sanitised() {
        assert_eq!(
            report_file_name("Ana María Silva", date()),
            "retina_report_Ana_Mar_a_Silva_2026-10-18.pdf"
        );
        assert_eq!(report_file_name("  ", date()), "retina_report_patient_2026-10-18.pdf");
        assert_eq!(report_file_name("O'Brien, Pat", date()), "retina_report_O_Brien_Pat_2026-10-18.pdf");
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text("one two three four five six", 10);
        assert!(lines.iter().all(|l| l.len() <= 10));
        assert_eq!(lines.join(" "), "one two three four five six");
        assert!(wrap_text("", 10).is_empty());
    }

    #[test]
    fn confidence_as_percent() {
        assert_eq!(confidence_percent(0.873), "87.3%");
        assert_eq!(confidence_percent(1.0), "100.0%");
    }

    #[test]
    fn render_produces_pdf() {
        let mut conn = open_memory_database().unwrap();
        let p = patient(&mut conn);
        let scans = vec![
            scan(p.id, "Moderate", "2026-10-01T09:00:00.000Z", Some("Manual note")),
            scan(p.id, "Mild", "2026-06-01T09:00:00.000Z", None),
        ];
        let bytes = render_report(&p, &scans, date()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn render_without_scans_fails() {
        let mut conn = open_memory_database().unwrap();
        let p = patient(&mut conn);
        assert!(matches!(
            render_report(&p, &[], date()),
            Err(ReportError::NoScans(_))
        ));
    }

    #[test]
    fn build_report_requires_a_scan() {
        let mut conn = open_memory_database().unwrap();
        let p = patient(&mut conn);
        assert!(matches!(
            build_patient_report(&conn, &p.id, date()),
            Err(ReportError::NoScans(_))
        ));

        db::insert_scan(&conn, &scan(p.id, "Severe", "2026-10-02T10:00:00.000Z", None)).unwrap();
        let report = build_patient_report(&conn, &p.id, date()).unwrap();
        assert!(report.bytes.starts_with(b"%PDF"));
        assert!(report.file_name.starts_with("retina_report_Ana_"));
    }
}
