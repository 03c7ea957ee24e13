//! Payment History API
//!
//! Authenticated client for the `/historystd` endpoint.
//!
//! - [`auth`]: credentials, clock and request signing
//! - [`client`]: the [`HistoryClient`] request pipeline
//! - [`error`]: failure taxonomy
//! - [`types`]: records and request windows

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::{
    AuthorizationHeader, Clock, Credentials, FixedClock, Signer, SigningError, SystemClock,
};
pub use client::{ClientConfig, HistoryClient};
pub use error::{FailureKind, FetchOutcome, HistoryError, HistoryResult};
pub use types::{HistoryRecord, RequestWindow, Timestamp};

/// Path appended to the configured API root.
pub const HISTORY_PATH: &str = "/historystd";

pub const API_VERSION_HEADER: &str = "x-api-version";
