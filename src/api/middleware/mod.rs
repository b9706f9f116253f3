//! API middleware stack.
//!
//! Execution order (outermost → innermost) on protected routes:
//! 1. Auth validator: session lookup
//! 2. Rate limiter: per-user minute and hour windows
//! 3. Role gates: admin, approved patient
//! 4. Audit logger: has the caller id
//!
//! Public routes run only the rate limiter, keyed by peer address, and audit.

pub mod audit;
pub mod auth;
pub mod rate;
