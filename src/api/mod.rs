//! HTTP API for channel-report.
//!
//! ## Endpoints
//!
//! - `POST /analyze` - Submit channel URLs; returns the job id and task number
//! - `GET /status/{job_id}` - Poll a job
//! - `GET /auth/login` - Start the Google sign-in
//! - `GET /auth/callback` - OAuth redirect target
//! - `GET /auth/status` - Whether the caller is signed in
//! - `GET /health` - Health check

mod auth;
mod routes;
#[cfg(test)]
mod testing;
pub mod types;

pub use auth::SessionUser;
pub use routes::{router, serve, AppState};
pub use types::*;
