//! Payment History Client
//!
//! Authenticated HTTP client for a payment history feed. Each fetch builds a
//! time-windowed query, signs it with HMAC-SHA256, issues a single GET and
//! maps the response into [`history::HistoryRecord`]s or a typed
//! [`history::HistoryError`].
//!
//! ## Example
//! ```no_run
//! use payment_history::{Configuration, HistoryClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new("https://api.example.com/v1", "2024-06")
//!         .with_credentials("public_token", "secret_key");
//!     let client = HistoryClient::new(None, None, &config)?;
//!     let records = client.fetch(None, None).await?;
//!     println!("Fetched {} records", records.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod history;
pub mod logging;

pub use config::{ConfigError, ConfigSource, Configuration};
pub use history::{
    FailureKind, FetchOutcome, HistoryClient, HistoryError, HistoryRecord, RequestWindow,
    Timestamp,
};
pub use logging::{HistoryLog, MemoryLog, TracingLog};
