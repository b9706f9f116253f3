//! Credentials and sessions.
//!
//! Passwords are hashed with PBKDF2-HMAC-SHA256 and a per-user random salt.
//! The iteration count is embedded in the stored hash (`pbkdf2-sha256$<n>$<b64>`)
//! so it can be raised later without invalidating existing accounts.
//!
//! Sessions are opaque bearer tokens. Only their SHA-256 digest is stored.

use base64::Engine;
use chrono::{Duration, Utc};
use pbkdf2::pbkdf2_hmac;
use regex::Regex;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::db::{self, DatabaseError};
use crate::models::enums::{ApprovalStatus, Role};
use crate::models::{AuthUser, Profile};

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;
pub const KEY_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 8;

const HASH_SCHEME: &str = "pbkdf2-sha256";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Session is invalid")]
    InvalidSession,
    #[error("Session expired")]
    SessionExpired,
    #[error("Account is {0}")]
    AccountNotApproved(ApprovalStatus),
    #[error("Email already registered: {0}")]
    EmailTaken(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ─── Passwords ────────────────────────────────────────────────────────────────

/// Hash a password with a fresh salt. Returns `(encoded_hash, encoded_salt)`.
pub fn hash_password(password: &str, iterations: u32) -> (String, String) {
    let salt = generate_salt();
    let hash = derive(password, &salt, iterations);
    let engine = base64::engine::general_purpose::STANDARD_NO_PAD;
    (
        format!("{HASH_SCHEME}${iterations}${}", engine.encode(hash.as_slice())),
        engine.encode(salt),
    )
}

/// Check a password against a stored hash. Malformed stored values never verify.
pub fn verify_password(password: &str, stored_hash: &str, stored_salt: &str) -> bool {
    let engine = base64::engine::general_purpose::STANDARD_NO_PAD;

    let mut parts = stored_hash.splitn(3, '$');
    let (Some(scheme), Some(iterations), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(expected), Ok(salt)) = (engine.decode(expected), engine.decode(stored_salt)) else {
        return false;
    };

    let actual = derive(password, &salt, iterations);
    actual.as_slice().ct_eq(&expected).into()
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LENGTH]> {
    let mut out = Zeroizing::new([0u8; KEY_LENGTH]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, out.as_mut());
    out
}

fn generate_salt() -> [u8; SALT_LENGTH] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Random password handed out once when an admin creates an account without one.
pub fn generate_temporary_password() -> String {
    let bytes: [u8; 12] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ─── Tokens ───────────────────────────────────────────────────────────────────

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of a bearer token, encoded for storage.
pub fn hash_token(token: &str) -> String {
    let digest: [u8; 32] = Sha256::digest(token.as_bytes()).into();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

// ─── Validation ───────────────────────────────────────────────────────────────

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email.trim())
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

// ─── Accounts ─────────────────────────────────────────────────────────────────

/// Fields needed to create a profile alongside its identity.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub status: ApprovalStatus,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
}

/// Create identity + profile in one transaction.
pub fn create_account(
    conn: &mut Connection,
    account: &NewAccount,
    iterations: u32,
) -> Result<Profile, AuthError> {
    let email = db::normalize_email(&account.email);
    if !is_valid_email(&email) {
        return Err(AuthError::InvalidInput("A valid email is required".into()));
    }
    let full_name = account.full_name.trim();
    if full_name.is_empty() {
        return Err(AuthError::InvalidInput("Full name is required".into()));
    }
    validate_password(&account.password)?;

    let tx = conn.transaction().map_err(DatabaseError::from)?;
    if db::get_auth_user_by_email(&tx, &email)?.is_some() {
        return Err(AuthError::EmailTaken(email));
    }

    let (password_hash, salt) = hash_password(&account.password, iterations);
    let now = db::now_timestamp();
    let user = AuthUser {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash,
        salt,
        created_at: now.clone(),
    };
    db::insert_auth_user(&tx, &user)?;

    let clean = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let profile = Profile {
        id: Uuid::new_v4(),
        user_id: user.id,
        email,
        full_name: full_name.to_string(),
        role: account.role,
        status: account.status,
        phone: clean(&account.phone),
        date_of_birth: clean(&account.date_of_birth),
        gender: clean(&account.gender),
        address: clean(&account.address),
        created_at: now.clone(),
        updated_at: now,
    };
    db::insert_profile(&tx, &profile)?;
    tx.commit().map_err(DatabaseError::from)?;

    Ok(profile)
}

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: String,
    pub profile: Profile,
}

/// Verify credentials and open a session.
///
/// Pending accounts may sign in (they only see their own status); rejected
/// and suspended accounts may not.
///
/// An unknown email still pays for one key derivation at `iterations`, so
/// response time does not reveal which addresses hold accounts.
pub fn login(
    conn: &Connection,
    email: &str,
    password: &str,
    ttl: Duration,
    iterations: u32,
) -> Result<IssuedSession, AuthError> {
    let Some(user) = db::get_auth_user_by_email(conn, email)? else {
        let _ = derive(password, &[0u8; SALT_LENGTH], iterations);
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(password, &user.password_hash, &user.salt) {
        return Err(AuthError::InvalidCredentials);
    }
    let profile = db::get_profile_by_user_id(conn, &user.id)?.ok_or(AuthError::InvalidCredentials)?;
    if !profile.status.can_sign_in() {
        return Err(AuthError::AccountNotApproved(profile.status));
    }

    let now = Utc::now();
    let token = generate_token();
    let expires_at = db::format_timestamp(&(now + ttl));
    db::insert_session(
        conn,
        &db::SessionRecord {
            token_hash: hash_token(&token),
            user_id: user.id,
            created_at: db::format_timestamp(&now),
            expires_at: expires_at.clone(),
        },
    )?;

    tracing::info!(user_id = %user.id, role = %profile.role, "Session opened");
    Ok(IssuedSession {
        token,
        expires_at,
        profile,
    })
}

/// Resolve a bearer token to its profile. Expired sessions are deleted on sight.
pub fn authenticate(conn: &Connection, token: &str) -> Result<Profile, AuthError> {
    let token_hash = hash_token(token);
    let session = db::get_session(conn, &token_hash)?.ok_or(AuthError::InvalidSession)?;

    if session.expires_at <= db::now_timestamp() {
        db::delete_session(conn, &token_hash)?;
        return Err(AuthError::SessionExpired);
    }

    let profile = db::get_profile_by_user_id(conn, &session.user_id)?
        .ok_or(AuthError::InvalidSession)?;
    if !profile.status.can_sign_in() {
        return Err(AuthError::AccountNotApproved(profile.status));
    }
    Ok(profile)
}

pub fn logout(conn: &Connection, token: &str) -> Result<(), AuthError> {
    db::delete_session(conn, &hash_token(token))?;
    Ok(())
}

/// Create the first admin if none exists. Returns true when an admin was created.
pub fn seed_admin(
    conn: &mut Connection,
    email: &str,
    password: &str,
    iterations: u32,
) -> Result<bool, AuthError> {
    if db::count_admins(conn)? > 0 {
        return Ok(false);
    }
    let profile = create_account(
        conn,
        &NewAccount {
            email: email.to_string(),
            password: password.to_string(),
            full_name: "Administrator".into(),
            role: Role::Admin,
            status: ApprovalStatus::Approved,
            phone: None,
            date_of_birth: None,
            gender: None,
            address: None,
        },
        iterations,
    )?;
    tracing::info!(profile_id = %profile.id, "Seeded initial admin account");
    Ok(true)
}
