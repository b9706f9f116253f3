//! Repository layer: table-scoped database operations.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with millisecond
//! precision, so lexical comparison in SQL matches chronological order.

mod profile;
mod scan;
mod session;

use chrono::{DateTime, SecondsFormat, Utc};

pub use profile::*;
pub use scan::*;
pub use session::*;

/// Current time in the stored timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
