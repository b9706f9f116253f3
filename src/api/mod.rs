//! HTTP API.
//!
//! Routes are nested under `/api/` and guarded by a middleware stack:
//! Auth → Rate Limit → Role gate → Audit → Handler (public routes skip auth).
//!
//! `api_router()` returns a composable `Router`; `server` binds it.

pub mod endpoints;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server, ApiServer, ServerError};
pub use types::ApiContext;
