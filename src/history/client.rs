//! Payment history API client
//!
//! One signed GET per call, no retries. Every call walks the same path:
//! build params, validate, sign, dispatch, map the response.
//!
//! # Example
//!
//! ```no_run
//! use payment_history::config::Configuration;
//! use payment_history::history::HistoryClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Configuration::from_env();
//!     let client = HistoryClient::new(None, None, &config)?;
//!
//!     let records = client.fetch(Some("2024-01-01T00:00:00Z".into()), None).await?;
//!     for record in records {
//!         println!("{}: {}", record.id, record.amount);
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, ClientBuilder, StatusCode, Url};

use super::auth::{Clock, Credentials, Signer, SystemClock};
use super::error::{FetchOutcome, HistoryError, HistoryResult};
use super::types::{parse_records, RequestWindow, Timestamp};
use super::{API_VERSION_HEADER, HISTORY_PATH};
use crate::config::{ConfigError, ConfigSource};
use crate::logging::{HistoryLog, TracingLog};

/// Client configuration
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// Per-request timeout. `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
    pub logger: Option<Arc<dyn HistoryLog>>,
    pub clock: Option<Arc<dyn Clock>>,
    /// Pre-built HTTP client, e.g. to share a connection pool.
    pub http_client: Option<Client>,
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn HistoryLog>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .field("clock", &self.clock.is_some())
            .field("http_client", &self.http_client.is_some())
            .finish()
    }
}

/// Payment history API client
///
/// Holds only immutable state; clones share the connection pool and can be
/// used from any number of tasks at once.
#[derive(Clone)]
pub struct HistoryClient {
    http_client: Client,
    base_url: Url,
    api_version: String,
    signer: Arc<Signer>,
    logger: Arc<dyn HistoryLog>,
    timeout: Option<Duration>,
}

impl HistoryClient {
    /// Create a client, falling back to `config` for credentials unless both
    /// halves are given.
    pub fn new<C>(
        public_token: Option<String>,
        secret_key: Option<String>,
        config: &C,
    ) -> HistoryResult<Self>
    where
        C: ConfigSource + ?Sized,
    {
        Self::with_config(public_token, secret_key, config, ClientConfig::default())
    }

    pub fn with_config<C>(
        public_token: Option<String>,
        secret_key: Option<String>,
        config: &C,
        client_config: ClientConfig,
    ) -> HistoryResult<Self>
    where
        C: ConfigSource + ?Sized,
    {
        let credentials = match (public_token, secret_key) {
            (Some(token), Some(secret)) => Credentials::new(token, secret),
            _ => Credentials::new(config.api_key()?, config.api_secret()?),
        };

        let api_root = config.api_url()?;
        let api_version = config.api_version()?;
        let endpoint = format!("{}{}", api_root.trim_end_matches('/'), HISTORY_PATH);
        let base_url = Url::parse(&endpoint).map_err(|_| ConfigError::InvalidUrl(endpoint))?;

        let http_client = match client_config.http_client {
            Some(client) => client,
            None => build_http_client(
                Client::builder()
                    .pool_max_idle_per_host(10)
                    .pool_idle_timeout(Duration::from_secs(90)),
            )?,
        };

        let clock = client_config
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock));
        let signer = Signer::new(credentials, base_url.path()).with_clock(clock);

        Ok(Self {
            http_client,
            base_url,
            api_version,
            signer: Arc::new(signer),
            logger: client_config
                .logger
                .unwrap_or_else(|| Arc::new(TracingLog)),
            timeout: client_config.timeout,
        })
    }

    /// Full endpoint URL, `{api_url}/historystd`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn public_token(&self) -> &str {
        self.signer.credentials().public_token()
    }

    /// Fetch payment history between optional bounds.
    pub async fn fetch(&self, from: Option<Timestamp>, to: Option<Timestamp>) -> FetchOutcome {
        self.fetch_window(&RequestWindow::new(from, to)).await
    }

    pub async fn fetch_window(&self, window: &RequestWindow) -> FetchOutcome {
        match self.execute(window).await {
            Ok(records) => {
                self.logger.info(&format!(
                    "Fetched {} payment history records",
                    records.len()
                ));
                Ok(records)
            }
            Err(err) => {
                self.log_failure(&err);
                Err(err)
            }
        }
    }

    async fn execute(&self, window: &RequestWindow) -> FetchOutcome {
        let params = window.query_params()?;
        let authorization = self.signer.sign("GET", &params)?;

        self.logger.info(&format!(
            "Requesting payment history from {} ({} window params)",
            self.base_url,
            params.len()
        ));

        let mut request = self
            .http_client
            .get(self.base_url.clone())
            .query(&params)
            .header(AUTHORIZATION, authorization.as_str())
            .header(API_VERSION_HEADER, self.api_version.as_str());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        match status {
            StatusCode::OK => parse_records(&body),
            StatusCode::UNAUTHORIZED => Err(HistoryError::Authentication { body }),
            other => Err(HistoryError::UnexpectedStatus {
                status: other.as_u16(),
                body,
            }),
        }
    }

    fn log_failure(&self, err: &HistoryError) {
        let message = match err {
            HistoryError::InvalidArgument { field } => format!("Invalid {} provided", field),
            HistoryError::Authentication { body } => {
                format!("Request could not be authenticated: {}", body)
            }
            HistoryError::UnexpectedStatus { status, body } => format!(
                "An error occurred with status code: {} and payload {}",
                status, body
            ),
            HistoryError::Parse(detail) => {
                format!("Failed to parse payment history: {}", detail)
            }
            other => other.to_string(),
        };
        self.logger.error(&message);
    }
}

fn build_http_client(builder: ClientBuilder) -> Result<Client, ConfigError> {
    builder
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

impl fmt::Debug for HistoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_version", &self.api_version)
            .field("public_token", &self.public_token())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
