//! Google API clients: Drive storage and the OAuth delegation flow.

pub mod drive;
pub mod oauth;

pub use drive::{DriveClient, GoogleDriveProvider};
pub use oauth::GoogleOAuth;
