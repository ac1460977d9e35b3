//! Remote data API gateway
//!
//! Fetches data from the EVE Swagger Interface with automatic retries on
//! transient errors, retrieval of all pages and optional per-language
//! variants.

mod client;
mod token;

pub use client::{retry_delay, EsiClient, DEFAULT_LANGUAGE};
pub use token::{RefreshingToken, StaticToken, TokenSource};

use structwatch_common::types::SyncError;
use thiserror::Error;

/// Remote API failure
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Gateway errors and timeouts, worth retrying
    #[error("remote API unavailable: {0}")]
    Transient(String),

    /// Any other unsuccessful response
    #[error("remote API returned {status}: {message}")]
    Permanent { status: u16, message: String },

    /// Missing, invalid or expired credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Response body could not be decoded
    #[error("invalid response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    /// Error code stored in the sync state of the failing subsystem
    pub fn sync_error(&self) -> SyncError {
        match self {
            FetchError::Transient(_) => SyncError::RemoteUnavailable,
            FetchError::Permanent { status: 403, .. } => SyncError::InsufficientPermissions,
            FetchError::Permanent { .. } => SyncError::Unknown,
            FetchError::Auth(_) => SyncError::TokenInvalid,
            FetchError::Decode(_) => SyncError::Unknown,
        }
    }

    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            502..=504 => FetchError::Transient(format!("HTTP {}: {}", status, message)),
            401 => FetchError::Auth(message),
            _ => FetchError::Permanent { status, message },
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            FetchError::Transient(e.to_string())
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::from_status(status.as_u16(), e.to_string())
        } else {
            FetchError::Permanent {
                status: 0,
                message: e.to_string(),
            }
        }
    }
}
