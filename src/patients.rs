//! Patient lifecycle: self-registration, admin creation and conversion,
//! updates, approval status, and deletion with stored images.

use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, AuthError, NewAccount};
use crate::db::{self, DatabaseError};
use crate::models::enums::{ApprovalStatus, Role};
use crate::models::{Profile, ProfileChanges};
use crate::scans;

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Self-registration body.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

/// Admin create body. Every field except email and name is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientInput {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientUpsert {
    pub profile: Profile,
    pub converted: bool,
    /// Present only when the account was created without a password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDetail {
    #[serde(flatten)]
    pub profile: Profile,
    pub scan_count: i64,
}

fn required(value: &Option<String>, what: &str) -> Result<String, PatientError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| PatientError::InvalidInput(format!("{what} is required")))
}

/// Create a pending patient from the public sign-up form.
pub fn register(
    conn: &mut Connection,
    registration: &Registration,
    iterations: u32,
) -> Result<Profile, PatientError> {
    let email = required(&registration.email, "Email")?;
    let password = registration
        .password
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| PatientError::InvalidInput("Password is required".into()))?;
    let full_name = required(&registration.full_name, "Full name")?;

    let profile = auth::create_account(
        conn,
        &NewAccount {
            email,
            password,
            full_name,
            role: Role::Patient,
            status: ApprovalStatus::Pending,
            phone: registration.phone.clone(),
            date_of_birth: None,
            gender: None,
            address: None,
        },
        iterations,
    )
    .map_err(conflict_on_taken)?;

    tracing::info!(profile_id = %profile.id, "Patient registered, awaiting approval");
    Ok(profile)
}

/// Admin creation. An existing patient with the same email is converted:
/// their profile takes the supplied fields and becomes approved.
pub fn create_or_convert(
    conn: &mut Connection,
    input: &PatientInput,
    iterations: u32,
) -> Result<PatientUpsert, PatientError> {
    let email = db::normalize_email(&required(&input.email, "Email")?);
    let full_name = required(&input.full_name, "Full name")?;
    if !auth::is_valid_email(&email) {
        return Err(PatientError::InvalidInput("A valid email is required".into()));
    }
    let password = input.password.clone().filter(|p| !p.is_empty());

    if let Some(existing) = db::get_profile_by_email(conn, &email)? {
        if existing.role != Role::Patient {
            return Err(PatientError::Conflict(format!(
                "{email} belongs to a non-patient account"
            )));
        }
        return convert_existing(conn, &existing, input, full_name, password, iterations);
    }

    let (password, temporary_password) = match password {
        Some(p) => (p, None),
        None => {
            let generated = auth::generate_temporary_password();
            (generated.clone(), Some(generated))
        }
    };

    let profile = auth::create_account(
        conn,
        &NewAccount {
            email,
            password,
            full_name,
            role: Role::Patient,
            status: ApprovalStatus::Approved,
            phone: input.phone.clone(),
            date_of_birth: input.date_of_birth.clone(),
            gender: input.gender.clone(),
            address: input.address.clone(),
        },
        iterations,
    )
    .map_err(conflict_on_taken)?;

    tracing::info!(patient_id = %profile.id, "Patient created by admin");
    Ok(PatientUpsert {
        profile,
        converted: false,
        temporary_password,
    })
}

fn convert_existing(
    conn: &mut Connection,
    existing: &Profile,
    input: &PatientInput,
    full_name: String,
    password: Option<String>,
    iterations: u32,
) -> Result<PatientUpsert, PatientError> {
    if let Some(password) = password.as_deref() {
        auth::validate_password(password)?;
    }

    let tx = conn.transaction().map_err(DatabaseError::from)?;
    let changes = ProfileChanges {
        full_name: Some(full_name),
        email: None,
        phone: input.phone.clone(),
        date_of_birth: input.date_of_birth.clone(),
        gender: input.gender.clone(),
        address: input.address.clone(),
    };
    db::update_profile(&tx, &existing.id, &changes)?;
    db::set_profile_status(&tx, &existing.id, ApprovalStatus::Approved)?;
    if let Some(password) = password.as_deref() {
        let (hash, salt) = auth::hash_password(password, iterations);
        db::update_auth_password(&tx, &existing.user_id, &hash, &salt)?;
    }
    let profile = db::get_profile(&tx, &existing.id)?
        .ok_or_else(|| DatabaseError::not_found("Profile", existing.id))?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(patient_id = %profile.id, "Existing patient converted to approved");
    Ok(PatientUpsert {
        profile,
        converted: true,
        temporary_password: None,
    })
}

pub fn patient_detail(conn: &Connection, id: &Uuid) -> Result<PatientDetail, PatientError> {
    let profile = db::get_patient(conn, id)?;
    let scan_count = db::count_scans_for_patient(conn, id)?;
    Ok(PatientDetail {
        profile,
        scan_count,
    })
}

/// Partial admin update of name and contact fields.
pub fn update_patient(
    conn: &Connection,
    id: &Uuid,
    changes: &ProfileChanges,
) -> Result<Profile, PatientError> {
    let changes = changes.clone().normalized();
    if changes.is_empty() {
        return Err(PatientError::InvalidInput("No fields to update".into()));
    }
    db::get_patient(conn, id)?;
    if let Some(email) = changes.email.as_deref() {
        if !auth::is_valid_email(email) {
            return Err(PatientError::InvalidInput("A valid email is required".into()));
        }
    }
    apply_changes(conn, id, &changes)
}

/// A patient editing their own record. Email is not editable here.
pub fn update_own_profile(
    conn: &Connection,
    profile: &Profile,
    changes: ProfileChanges,
) -> Result<Profile, PatientError> {
    let changes = ProfileChanges {
        email: None,
        ..changes.normalized()
    };
    if changes.is_empty() {
        return Err(PatientError::InvalidInput("No fields to update".into()));
    }
    apply_changes(conn, &profile.id, &changes)
}

fn apply_changes(
    conn: &Connection,
    id: &Uuid,
    changes: &ProfileChanges,
) -> Result<Profile, PatientError> {
    db::update_profile(conn, id, changes).map_err(|e| match e {
        DatabaseError::Duplicate { value, .. } => {
            PatientError::Conflict(format!("Email already registered: {value}"))
        }
        other => other.into(),
    })
}

/// Change approval status. Leaving a sign-in state revokes open sessions.
pub fn set_status(
    conn: &Connection,
    id: &Uuid,
    status: ApprovalStatus,
) -> Result<Profile, PatientError> {
    let patient = db::get_patient(conn, id)?;
    db::set_profile_status(conn, id, status)?;
    if !status.can_sign_in() {
        let revoked = db::delete_sessions_for_user(conn, &patient.user_id)?;
        tracing::info!(patient_id = %id, revoked, "Sessions revoked on status change");
    }
    tracing::info!(patient_id = %id, from = %patient.status, to = %status, "Patient status changed");
    db::get_profile(conn, id)?
        .ok_or_else(|| DatabaseError::not_found("Patient", id).into())
}

/// Remove a patient: scans and their images, sessions, profile, identity.
pub fn delete_patient(
    conn: &mut Connection,
    uploads_dir: &Path,
    id: &Uuid,
) -> Result<(), PatientError> {
    let patient = db::get_patient(conn, id)?;

    let tx = conn.transaction().map_err(DatabaseError::from)?;
    let image_files = db::delete_scans_for_patient(&tx, id)?;
    db::delete_sessions_for_user(&tx, &patient.user_id)?;
    db::delete_profile(&tx, id)?;
    db::delete_auth_user(&tx, &patient.user_id)?;
    tx.commit().map_err(DatabaseError::from)?;

    scans::remove_image_files(uploads_dir, &image_files);
    tracing::info!(patient_id = %id, images = image_files.len(), "Patient deleted");
    Ok(())
}

fn conflict_on_taken(e: AuthError) -> PatientError {
    match e {
        AuthError::EmailTaken(email) => PatientError::Conflict(format!("Email already registered: {email}")),
        AuthError::InvalidInput(msg) => PatientError::InvalidInput(msg),
        other => PatientError::Auth(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::ScanResult;

    const FAST: u32 = 1_000;

    fn input(email: &str, name: &str) -> PatientInput {
        PatientInput {
            email: Some(email.into()),
            full_name: Some(name.into()),
            ..Default::default()
        }
    }

    fn registration(email: &str) -> Registration {
        Registration {
            email: Some(email.into()),
            password: Some("password-123".into()),
            full_name: Some("Ana Silva".into()),
            phone: None,
        }
    }

    #[test]
    fn register_creates_pending_patient() {
        let mut conn = open_memory_database().unwrap();
        let profile = register(&mut conn, &registration("ana@example.com"), FAST).unwrap();
        assert_eq!(profile.role, Role::Patient);
        assert_eq!(profile.status, ApprovalStatus::Pending);
    }

    #[test]
    fn register_validation_and_duplicates() {
        let mut conn = open_memory_database().unwrap();
        let mut missing = registration("ana@example.com");
        missing.full_name = None;
        assert!(matches!(
            register(&mut conn, &missing, FAST),
            Err(PatientError::InvalidInput(_))
        ));

        register(&mut conn, &registration("ana@example.com"), FAST).unwrap();
        assert!(matches!(
            register(&mut conn, &registration("ANA@example.com"), FAST),
            Err(PatientError::Conflict(_))
        ));
    }

    #[test]
    fn admin_create_generates_temporary_password() {
        let mut conn = open_memory_database().unwrap();
        let result = create_or_convert(&mut conn, &input("bob@example.com", "Bob"), FAST).unwrap();
        assert!(!result.converted);
        assert_eq!(result.profile.status, ApprovalStatus::Approved);

        let temp = result.temporary_password.unwrap();
        let session = auth::login(&conn, "bob@example.com", &temp, chrono::Duration::hours(1), FAST).unwrap();
        assert_eq!(session.profile.id, result.profile.id);
    }

    #[test]
    fn admin_create_with_password_returns_none() {
        let mut conn = open_memory_database().unwrap();
        let mut body = input("bob@example.com", "Bob");
        body.password = Some("chosen-password".into());
        let result = create_or_convert(&mut conn, &body, FAST).unwrap();
        assert!(result.temporary_password.is_none());
    }

    #[test]
    fn duplicate_email_converts_pending_patient() {
        let mut conn = open_memory_database().unwrap();
        let pending = register(&mut conn, &registration("ana@example.com"), FAST).unwrap();

        let mut body = input("Ana@Example.com", "Ana Maria Silva");
        body.phone = Some("555-0101".into());
        let result = create_or_convert(&mut conn, &body, FAST).unwrap();

        assert!(result.converted);
        assert_eq!(result.profile.id, pending.id);
        assert_eq!(result.profile.status, ApprovalStatus::Approved);
        assert_eq!(result.profile.full_name, "Ana Maria Silva");
        assert_eq!(result.profile.phone.as_deref(), Some("555-0101"));
        assert!(result.temporary_password.is_none());

        // Original password still works.
        auth::login(&conn, "ana@example.com", "password-123", chrono::Duration::hours(1), FAST).unwrap();
    }

    #[test]
    fn admin_email_is_conflict() {
        let mut conn = open_memory_database().unwrap();
        auth::seed_admin(&mut conn, "root@example.com", "admin-password", FAST).unwrap();
        assert!(matches!(
            create_or_convert(&mut conn, &input("root@example.com", "Root"), FAST),
            Err(PatientError::Conflict(_))
        ));
    }

    #[test]
    fn create_requires_email_and_name() {
        let mut conn = open_memory_database().unwrap();
        assert!(matches!(
            create_or_convert(&mut conn, &input("  ", "Bob"), FAST),
            Err(PatientError::InvalidInput(_))
        ));
        assert!(matches!(
            create_or_convert(&mut conn, &input("bob@example.com", ""), FAST),
            Err(PatientError::InvalidInput(_))
        ));
        assert!(matches!(
            create_or_convert(&mut conn, &input("not-an-email", "Bob"), FAST),
            Err(PatientError::InvalidInput(_))
        ));
    }

    #[test]
    fn update_rejects_empty_and_collisions() {
        let mut conn = open_memory_database().unwrap();
        let a = create_or_convert(&mut conn, &input("a@example.com", "A"), FAST).unwrap().profile;
        create_or_convert(&mut conn, &input("b@example.com", "B"), FAST).unwrap();

        assert!(matches!(
            update_patient(&conn, &a.id, &ProfileChanges::default()),
            Err(PatientError::InvalidInput(_))
        ));

        let blank_name = ProfileChanges {
            full_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_patient(&conn, &a.id, &blank_name),
            Err(PatientError::InvalidInput(_))
        ));

        let collide = ProfileChanges {
            email: Some("b@example.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_patient(&conn, &a.id, &collide),
            Err(PatientError::Conflict(_))
        ));
    }

    #[test]
    fn own_profile_update_ignores_email() {
        let mut conn = open_memory_database().unwrap();
        let me = create_or_convert(&mut conn, &input("a@example.com", "A"), FAST).unwrap().profile;

        let only_email = ProfileChanges {
            email: Some("new@example.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_own_profile(&conn, &me, only_email),
            Err(PatientError::InvalidInput(_))
        ));

        let updated = update_own_profile(
            &conn,
            &me,
            ProfileChanges {
                email: Some("new@example.com".into()),
                address: Some("12 Rue Verte".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.email, "a@example.com");
        assert_eq!(updated.address.as_deref(), Some("12 Rue Verte"));
    }

    #[test]
    fn suspending_revokes_sessions() {
        let mut conn = open_memory_database().unwrap();
        let mut body = input("a@example.com", "A");
        body.password = Some("password-123".into());
        let p = create_or_convert(&mut conn, &body, FAST).unwrap().profile;
        let session = auth::login(&conn, "a@example.com", "password-123", chrono::Duration::hours(1), FAST).unwrap();

        let updated = set_status(&conn, &p.id, ApprovalStatus::Suspended).unwrap();
        assert_eq!(updated.status, ApprovalStatus::Suspended);
        assert!(matches!(
            auth::authenticate(&conn, &session.token),
            Err(AuthError::InvalidSession)
        ));
    }

    #[test]
    fn delete_removes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let mut conn = open_memory_database().unwrap();
        let p = create_or_convert(&mut conn, &input("a@example.com", "A"), FAST).unwrap().profile;

        std::fs::write(tmp.path().join("img.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
        let now = db::now_timestamp();
        db::insert_scan(
            &conn,
            &ScanResult {
                id: Uuid::new_v4(),
                patient_id: p.id,
                image_url: "/api/scans/x/image".into(),
                image_path: "img.jpg".into(),
                prediction: "Mild".into(),
                confidence: 0.6,
                suggestion: "s".into(),
                manual_suggestion: None,
                created_by: None,
                created_at: now.clone(),
                updated_at: now,
            },
        )
        .unwrap();

        delete_patient(&mut conn, tmp.path(), &p.id).unwrap();
        assert!(db::get_profile(&conn, &p.id).unwrap().is_none());
        assert!(db::get_auth_user_by_email(&conn, "a@example.com").unwrap().is_none());
        assert_eq!(db::count_scans(&conn).unwrap(), 0);
        assert!(!tmp.path().join("img.jpg").exists());
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mut conn = open_memory_database().unwrap();
        assert!(matches!(
            delete_patient(&mut conn, tmp.path(), &Uuid::new_v4()),
            Err(PatientError::Database(DatabaseError::NotFound { .. }))
        ));
    }
}
