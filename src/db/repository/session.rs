use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::profile::parse_uuid;
use crate::db::DatabaseError;

/// A stored session. Only the token hash is persisted.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: String,
    pub expires_at: String,
}

pub fn insert_session(conn: &Connection, session: &SessionRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            session.token_hash,
            session.user_id.to_string(),
            session.created_at,
            session.expires_at,
        ],
    )?;
    Ok(())
}

pub fn get_session(
    conn: &Connection,
    token_hash: &str,
) -> Result<Option<SessionRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT token_hash, user_id, created_at, expires_at
             FROM sessions WHERE token_hash = ?1",
            params![token_hash],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(token_hash, user_id, created_at, expires_at)| {
        Ok(SessionRecord {
            token_hash,
            user_id: parse_uuid(&user_id)?,
            created_at,
            expires_at,
        })
    })
    .transpose()
}

pub fn delete_session(conn: &Connection, token_hash: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        params![token_hash],
    )?;
    Ok(())
}

pub fn delete_sessions_for_user(conn: &Connection, user_id: &Uuid) -> Result<usize, DatabaseError> {
    let n = conn.execute(
        "DELETE FROM sessions WHERE user_id = ?1",
        params![user_id.to_string()],
    )?;
    Ok(n)
}

/// Drop sessions whose expiry is before `now` (RFC 3339, same format as stored).
pub fn purge_expired_sessions(conn: &Connection, now: &str) -> Result<usize, DatabaseError> {
    let n = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
    Ok(n)
}
