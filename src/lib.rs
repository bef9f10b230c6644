//! # channel-report
//!
//! Background service that turns a list of YouTube channel URLs into a
//! spreadsheet of engagement metrics delivered to Google Drive.
//!
//! ## Job Flow
//! 1. `POST /analyze` allocates the next task number in today's Drive folder
//! 2. A job is registered (`queue`) and handed to a background task
//! 3. Each URL is resolved, its recent videos fetched and metrics computed (`working`)
//! 4. The workbook is uploaded as `Task N Output.xlsx` and the link stored (`done`),
//!    or the first error is stored (`failed`)
//! 5. Clients poll `GET /status/{job_id}`
//!
//! ## Modules
//! - `api`: HTTP routes, sessions and server bootstrap
//! - `auth`: delegated credentials, their file store and session tokens
//! - `google`: Drive and OAuth clients
//! - `youtube`: channel resolution and statistics
//! - `metrics`: per-channel metric computation
//! - `export`: workbook rendering and upload
//! - `jobs`: job store, task numbering and the analysis runner

pub mod api;
pub mod auth;
pub mod config;
pub mod export;
pub mod google;
pub mod jobs;
pub mod metrics;
pub mod storage;
pub mod youtube;

pub use config::Config;
pub use jobs::{JobStore, OverallStatus, TaskStatus};
