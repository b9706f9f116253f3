//! Admin and patient dashboard aggregates.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{Profile, ScanResult, ScanWithPatient};

/// Number of calendar months shown in the admin trend chart.
pub const TREND_MONTHS: u32 = 6;
const RECENT_LIMIT: u32 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct PredictionCount {
    pub prediction: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub total_patients: i64,
    pub patients_by_status: BTreeMap<&'static str, i64>,
    pub total_scans: i64,
    pub scans_this_month: i64,
    pub predictions: Vec<PredictionCount>,
    pub monthly_scans: Vec<MonthlyCount>,
    pub recent_scans: Vec<ScanWithPatient>,
    pub pending_patients: Vec<Profile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPoint {
    /// `YYYY-MM-DD`
    pub date: String,
    pub prediction: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDashboard {
    pub profile: Profile,
    pub total_scans: i64,
    pub latest_scan: Option<ScanResult>,
    pub history: Vec<HistoryPoint>,
}

pub fn admin_dashboard(conn: &Connection, now: DateTime<Utc>) -> Result<AdminDashboard, DatabaseError> {
    let by_status = db::count_patients_by_status(conn)?;
    let total_patients: i64 = by_status.iter().map(|(_, n)| n).sum();
    let patients_by_status = by_status
        .into_iter()
        .map(|(status, n)| (status.as_str(), n))
        .collect();

    let months = trailing_months(now.year(), now.month(), TREND_MONTHS);
    let this_month = month_start(now.year(), now.month());
    let window_start = months
        .first()
        .map(|(y, m)| month_start(*y, *m))
        .unwrap_or_else(|| this_month.clone());

    let predictions = db::count_scans_by_prediction(conn)?
        .into_iter()
        .map(|(prediction, count)| PredictionCount { prediction, count })
        .collect();

    let window = db::get_scans_since(conn, &window_start)?;
    let monthly_scans = bucket_by_month(&months, window.iter().map(|s| s.created_at.as_str()));

    let (recent_scans, _) = db::list_scans(conn, None, RECENT_LIMIT, 0)?;

    Ok(AdminDashboard {
        total_patients,
        patients_by_status,
        total_scans: db::count_scans(conn)?,
        scans_this_month: db::count_scans_since(conn, &this_month)?,
        predictions,
        monthly_scans,
        recent_scans,
        pending_patients: db::list_pending_patients(conn, RECENT_LIMIT)?,
    })
}

pub fn patient_dashboard(conn: &Connection, patient_id: &Uuid) -> Result<PatientDashboard, DatabaseError> {
    let profile = db::get_patient(conn, patient_id)?;
    let scans = db::get_scans_for_patient(conn, patient_id, None)?;

    let history = scans
        .iter()
        .rev()
        .map(|s| HistoryPoint {
            date: s.created_at.get(..10).unwrap_or(&s.created_at).to_string(),
            prediction: s.prediction.clone(),
            confidence: s.confidence,
        })
        .collect();

    Ok(PatientDashboard {
        profile,
        total_scans: scans.len() as i64,
        latest_scan: scans.into_iter().next(),
        history,
    })
}

/// The `count` calendar months ending at (year, month), oldest first.
pub fn trailing_months(year: i32, month: u32, count: u32) -> Vec<(i32, u32)> {
    let current = year * 12 + month as i32 - 1;
    (0..count as i32)
        .rev()
        .map(|back| {
            let index = current - back;
            (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
        })
        .collect()
}

/// First instant of a month, in stored timestamp format.
fn month_start(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}-01T00:00:00.000Z")
}

/// Zero-filled counts per month. Timestamps outside the months are ignored.
pub fn bucket_by_month<'a>(
    months: &[(i32, u32)],
    timestamps: impl Iterator<Item = &'a str>,
) -> Vec<MonthlyCount> {
    let mut buckets: Vec<MonthlyCount> = months
        .iter()
        .map(|(y, m)| MonthlyCount {
            month: format!("{y:04}-{m:02}"),
            count: 0,
        })
        .collect();

    for ts in timestamps {
        let Some(key) = ts.get(..7) else { continue };
        if let Some(bucket) = buckets.iter_mut().find(|b| b.month == key) {
            bucket.count += 1;
        }
    }
    buckets
}
