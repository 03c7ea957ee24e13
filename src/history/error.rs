//! Error taxonomy for the history client

use thiserror::Error;

use super::auth::SigningError;
use crate::config::ConfigError;

/// Coarse classification of a [`HistoryError`], convenient for matching
/// without caring about the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Configuration,
    InvalidArgument,
    Signing,
    Authentication,
    UnexpectedStatus,
    Parse,
    Network,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A caller-supplied timestamp could not be interpreted. Detected before
    /// any signing or network work.
    #[error("{field} is invalid")]
    InvalidArgument { field: &'static str },

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    /// The server answered 401.
    #[error("Request could not be authenticated.")]
    Authentication { body: String },

    /// Any status other than 200 and 401.
    #[error("An unexpected error occurred.")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// Transport failure: DNS, refused connection, TLS, timeout.
    #[error("Network error occurred: {0}")]
    Network(String),
}

impl HistoryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Configuration(_) => FailureKind::Configuration,
            Self::InvalidArgument { .. } => FailureKind::InvalidArgument,
            Self::Signing(_) => FailureKind::Signing,
            Self::Authentication { .. } => FailureKind::Authentication,
            Self::UnexpectedStatus { .. } => FailureKind::UnexpectedStatus,
            Self::Parse(_) => FailureKind::Parse,
            Self::Network(_) => FailureKind::Network,
        }
    }

    /// HTTP status code, for failures that came from a completed round-trip.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { .. } => Some(401),
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body, for failures that came from a completed round-trip.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Authentication { body } | Self::UnexpectedStatus { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HistoryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Result of a single fetch.
pub type FetchOutcome = HistoryResult<Vec<super::types::HistoryRecord>>;
