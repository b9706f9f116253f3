use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::profile::parse_uuid;
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_scan(conn: &Connection, scan: &ScanResult) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO scan_results (id, patient_id, image_url, image_path, prediction,
         confidence, suggestion, manual_suggestion, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            scan.id.to_string(),
            scan.patient_id.to_string(),
            scan.image_url,
            scan.image_path,
            scan.prediction,
            scan.confidence,
            scan.suggestion,
            scan.manual_suggestion,
            scan.created_by.map(|id| id.to_string()),
            scan.created_at,
            scan.updated_at,
        ],
    )?;
    Ok(())
}

const SCAN_COLUMNS: &str = "s.id, s.patient_id, s.image_url, s.image_path, s.prediction,
     s.confidence, s.suggestion, s.manual_suggestion, s.created_by, s.created_at, s.updated_at";

pub fn get_scan(conn: &Connection, id: &Uuid) -> Result<Option<ScanResult>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {SCAN_COLUMNS} FROM scan_results s WHERE s.id = ?1"),
            params![id.to_string()],
            scan_row_from_rusqlite,
        )
        .optional()?;
    row.map(scan_from_row).transpose()
}

/// A patient's scans, newest first. `limit = None` returns the full history.
pub fn get_scans_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    limit: Option<u32>,
) -> Result<Vec<ScanResult>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCAN_COLUMNS} FROM scan_results s WHERE s.patient_id = ?1
         ORDER BY s.created_at DESC, s.id LIMIT ?2"
    ))?;
    let limit = limit.map(i64::from).unwrap_or(-1);
    let rows = stmt.query_map(params![patient_id.to_string(), limit], scan_row_from_rusqlite)?;

    let mut scans = Vec::new();
    for row in rows {
        scans.push(scan_from_row(row?)?);
    }
    Ok(scans)
}

pub fn count_scans_for_patient(conn: &Connection, patient_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM scan_results WHERE patient_id = ?1",
        params![patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Scans across all patients, newest first, joined with patient names.
/// Returns the page plus the unpaginated total.
pub fn list_scans(
    conn: &Connection,
    patient_id: Option<&Uuid>,
    limit: u32,
    offset: u32,
) -> Result<(Vec<ScanWithPatient>, i64), DatabaseError> {
    let patient = patient_id.map(|id| id.to_string());

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM scan_results WHERE (?1 IS NULL OR patient_id = ?1)",
        params![patient],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {SCAN_COLUMNS}, p.full_name
         FROM scan_results s JOIN profiles p ON p.id = s.patient_id
         WHERE (?1 IS NULL OR s.patient_id = ?1)
         ORDER BY s.created_at DESC, s.id LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(params![patient, limit, offset], |row| {
        Ok((scan_row_from_rusqlite(row)?, row.get::<_, String>(11)?))
    })?;

    let mut scans = Vec::new();
    for row in rows {
        let (scan, patient_name) = row?;
        scans.push(ScanWithPatient {
            scan: scan_from_row(scan)?,
            patient_name,
        });
    }
    Ok((scans, total))
}

/// Scans created at or after `since` (RFC 3339), oldest first.
pub fn get_scans_since(conn: &Connection, since: &str) -> Result<Vec<ScanResult>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCAN_COLUMNS} FROM scan_results s WHERE s.created_at >= ?1
         ORDER BY s.created_at ASC"
    ))?;
    let rows = stmt.query_map(params![since], scan_row_from_rusqlite)?;

    let mut scans = Vec::new();
    for row in rows {
        scans.push(scan_from_row(row?)?);
    }
    Ok(scans)
}

pub fn count_scans_since(conn: &Connection, since: &str) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM scan_results WHERE created_at >= ?1",
        params![since],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_scans(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM scan_results", [], |row| row.get(0))?;
    Ok(count)
}

/// (prediction label, count) pairs, most frequent first.
pub fn count_scans_by_prediction(conn: &Connection) -> Result<Vec<(String, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT prediction, COUNT(*) AS n FROM scan_results
         GROUP BY prediction ORDER BY n DESC, prediction",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Delete a patient's scans and return the stored image file names so the
/// caller can remove them from disk.
pub fn delete_scans_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT image_path FROM scan_results WHERE patient_id = ?1")?;
    let paths = stmt
        .query_map(params![patient_id.to_string()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    conn.execute(
        "DELETE FROM scan_results WHERE patient_id = ?1",
        params![patient_id.to_string()],
    )?;
    Ok(paths)
}

// Internal row type for ScanResult mapping
struct ScanRow {
    id: String,
    patient_id: String,
    image_url: String,
    image_path: String,
    prediction: String,
    confidence: f64,
    suggestion: String,
    manual_suggestion: Option<String>,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

fn scan_row_from_rusqlite(row: &rusqlite::Row) -> rusqlite::Result<ScanRow> {
    Ok(ScanRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        image_url: row.get(2)?,
        image_path: row.get(3)?,
        prediction: row.get(4)?,
        confidence: row.get(5)?,
        suggestion: row.get(6)?,
        manual_suggestion: row.get(7)?,
        created_by: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn scan_from_row(row: ScanRow) -> Result<ScanResult, DatabaseError> {
    Ok(ScanResult {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        image_url: row.image_url,
        image_path: row.image_path,
        prediction: row.prediction,
        confidence: row.confidence,
        suggestion: row.suggestion,
        manual_suggestion: row.manual_suggestion,
        created_by: row.created_by.as_deref().map(parse_uuid).transpose()?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
