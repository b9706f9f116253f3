use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::now_timestamp;
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

// ─── Auth identities ──────────────────────────────────────────────────────────

pub fn insert_auth_user(conn: &Connection, user: &AuthUser) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO auth_users (id, email, password_hash, salt, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id.to_string(),
            user.email,
            user.password_hash,
            user.salt,
            user.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_auth_user_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<AuthUser>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, email, password_hash, salt, created_at
             FROM auth_users WHERE email = ?1",
            params![normalize_email(email)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, email, password_hash, salt, created_at)| {
        Ok(AuthUser {
            id: parse_uuid(&id)?,
            email,
            password_hash,
            salt,
            created_at,
        })
    })
    .transpose()
}

pub fn update_auth_password(
    conn: &Connection,
    user_id: &Uuid,
    password_hash: &str,
    salt: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE auth_users SET password_hash = ?1, salt = ?2 WHERE id = ?3",
        params![password_hash, salt, user_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("AuthUser", user_id));
    }
    Ok(())
}

pub fn delete_auth_user(conn: &Connection, user_id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM auth_users WHERE id = ?1",
        params![user_id.to_string()],
    )?;
    Ok(())
}

// ─── Profiles ─────────────────────────────────────────────────────────────────

pub fn insert_profile(conn: &Connection, profile: &Profile) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO profiles (id, user_id, email, full_name, role, status, phone,
         date_of_birth, gender, address, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            profile.id.to_string(),
            profile.user_id.to_string(),
            profile.email,
            profile.full_name,
            profile.role.as_str(),
            profile.status.as_str(),
            profile.phone,
            profile.date_of_birth,
            profile.gender,
            profile.address,
            profile.created_at,
            profile.updated_at,
        ],
    )?;
    Ok(())
}

const PROFILE_COLUMNS: &str = "id, user_id, email, full_name, role, status, phone,
     date_of_birth, gender, address, created_at, updated_at";

pub fn get_profile(conn: &Connection, id: &Uuid) -> Result<Option<Profile>, DatabaseError> {
    query_one_profile(conn, "id = ?1", &id.to_string())
}

pub fn get_profile_by_user_id(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Option<Profile>, DatabaseError> {
    query_one_profile(conn, "user_id = ?1", &user_id.to_string())
}

pub fn get_profile_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<Profile>, DatabaseError> {
    query_one_profile(conn, "email = ?1", &normalize_email(email))
}

/// Fetch a profile that must be a patient. Admin ids read as not found.
pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Profile, DatabaseError> {
    get_profile(conn, id)?
        .filter(|p| p.role == Role::Patient)
        .ok_or_else(|| DatabaseError::not_found("Patient", id))
}

fn query_one_profile(
    conn: &Connection,
    predicate: &str,
    value: &str,
) -> Result<Option<Profile>, DatabaseError> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE {predicate}");
    let row = conn
        .query_row(&sql, params![value], profile_row_from_rusqlite)
        .optional()?;
    row.map(profile_from_row).transpose()
}

/// Filter for the admin patient listing.
#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    pub search: Option<String>,
    pub status: Option<ApprovalStatus>,
    pub limit: u32,
    pub offset: u32,
}

/// Search text matches literally: `%` and `_` are not wildcards.
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Patients matching the filter, newest first, plus the unpaginated total.
pub fn list_patients(
    conn: &Connection,
    filter: &PatientFilter,
) -> Result<(Vec<Profile>, i64), DatabaseError> {
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(&s.to_lowercase())));
    let status = filter.status.map(|s| s.as_str());

    let where_clause = "role = 'patient'
         AND (?1 IS NULL OR LOWER(full_name) LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\')
         AND (?2 IS NULL OR status = ?2)";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM profiles WHERE {where_clause}"),
        params![pattern, status],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE {where_clause}
         ORDER BY created_at DESC, id LIMIT ?3 OFFSET ?4"
    ))?;
    let rows = stmt.query_map(
        params![pattern, status, filter.limit, filter.offset],
        profile_row_from_rusqlite,
    )?;

    let mut profiles = Vec::new();
    for row in rows {
        profiles.push(profile_from_row(row?)?);
    }
    Ok((profiles, total))
}

/// Newest patients still waiting for approval.
pub fn list_pending_patients(conn: &Connection, limit: u32) -> Result<Vec<Profile>, DatabaseError> {
    let (profiles, _) = list_patients(
        conn,
        &PatientFilter {
            status: Some(ApprovalStatus::Pending),
            limit,
            ..Default::default()
        },
    )?;
    Ok(profiles)
}

/// Apply partial changes and return the updated row.
///
/// An email change is mirrored onto the auth identity so that sign-in keeps
/// working. Collisions with another identity are reported as `Duplicate`.
pub fn update_profile(
    conn: &Connection,
    id: &Uuid,
    changes: &ProfileChanges,
) -> Result<Profile, DatabaseError> {
    let current = get_profile(conn, id)?.ok_or_else(|| DatabaseError::not_found("Profile", id))?;

    let email = match changes.email.as_deref() {
        Some(new_email) => {
            let new_email = normalize_email(new_email);
            if new_email != current.email {
                if let Some(other) = get_auth_user_by_email(conn, &new_email)? {
                    if other.id != current.user_id {
                        return Err(DatabaseError::Duplicate {
                            field: "email".into(),
                            value: new_email,
                        });
                    }
                }
                conn.execute(
                    "UPDATE auth_users SET email = ?1 WHERE id = ?2",
                    params![new_email, current.user_id.to_string()],
                )?;
            }
            new_email
        }
        None => current.email.clone(),
    };

    let pick = |new: &Option<String>, old: &Option<String>| -> Option<String> {
        match new {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => old.clone(),
        }
    };

    let full_name = changes
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| current.full_name.clone());

    conn.execute(
        "UPDATE profiles SET email = ?1, full_name = ?2, phone = ?3, date_of_birth = ?4,
         gender = ?5, address = ?6, updated_at = ?7 WHERE id = ?8",
        params![
            email,
            full_name,
            pick(&changes.phone, &current.phone),
            pick(&changes.date_of_birth, &current.date_of_birth),
            pick(&changes.gender, &current.gender),
            pick(&changes.address, &current.address),
            now_timestamp(),
            id.to_string(),
        ],
    )?;

    get_profile(conn, id)?.ok_or_else(|| DatabaseError::not_found("Profile", id))
}

pub fn set_profile_status(
    conn: &Connection,
    id: &Uuid,
    status: ApprovalStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE profiles SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_timestamp(), id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Profile", id));
    }
    Ok(())
}

pub fn delete_profile(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM profiles WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

pub fn count_admins(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE role = 'admin'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Patient counts per approval status. Statuses with no rows are included as 0.
pub fn count_patients_by_status(
    conn: &Connection,
) -> Result<Vec<(ApprovalStatus, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM profiles WHERE role = 'patient' GROUP BY status",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut counts: Vec<(ApprovalStatus, i64)> =
        ApprovalStatus::all().iter().map(|s| (*s, 0)).collect();
    for row in rows {
        let (status, count) = row?;
        let status = ApprovalStatus::from_str(&status)?;
        if let Some(slot) = counts.iter_mut().find(|(s, _)| *s == status) {
            slot.1 = count;
        }
    }
    Ok(counts)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|_| DatabaseError::InvalidEnum {
        field: "uuid".into(),
        value: s.into(),
    })
}

// Internal row type for Profile mapping
struct ProfileRow {
    id: String,
    user_id: String,
    email: String,
    full_name: String,
    role: String,
    status: String,
    phone: Option<String>,
    date_of_birth: Option<String>,
    gender: Option<String>,
    address: Option<String>,
    created_at: String,
    updated_at: String,
}

fn profile_row_from_rusqlite(row: &rusqlite::Row) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        role: row.get(4)?,
        status: row.get(5)?,
        phone: row.get(6)?,
        date_of_birth: row.get(7)?,
        gender: row.get(8)?,
        address: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn profile_from_row(row: ProfileRow) -> Result<Profile, DatabaseError> {
    Ok(Profile {
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        email: row.email,
        full_name: row.full_name,
        role: Role::from_str(&row.role)?,
        status: ApprovalStatus::from_str(&row.status)?,
        phone: row.phone,
        date_of_birth: row.date_of_birth,
        gender: row.gender,
        address: row.address,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
