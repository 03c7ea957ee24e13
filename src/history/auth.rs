//! Request signing for the history API
//!
//! Implements an S3-style HMAC-SHA256 scheme. The string to sign binds the
//! HTTP method, the endpoint path, the canonical query string and the signing
//! time:
//!
//! ```text
//! GET\n/v1/historystd\ntimestamp_from=2024-01-01T00%3A00%3A00Z\n1704067200
//! ```
//!
//! The resulting header value is `S3 {public_token}:{unix_seconds}:{signature}`
//! where the signature is the base64-encoded MAC keyed with the secret.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Scheme tag at the front of every authorization header.
pub const AUTH_SCHEME: &str = "S3";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("public token and secret key must both be non-empty")]
    MissingCredentials,
    #[error("HTTP method must not be empty")]
    InvalidMethod,
}

/// API credentials container
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    public_token: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(public_token: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_token: public_token.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn public_token(&self) -> &str {
        &self.public_token
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Both halves present and not blank.
    pub fn is_complete(&self) -> bool {
        !self.public_token.trim().is_empty() && !self.secret_key.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("public_token", &self.public_token)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Time source for signatures.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Signed `Authorization` header value for exactly one request.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationHeader(String);

impl AuthorizationHeader {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for AuthorizationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationHeader(<redacted>)")
    }
}

/// Build the canonical query string: pairs sorted by key then value, each
/// side percent-encoded over the RFC 3986 unreserved set.
pub fn canonical_query<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k.as_ref()).into_owned(),
                urlencoding::encode(v.as_ref()).into_owned(),
            )
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, path: &str, canonical_query: &str, unix_secs: i64) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        path,
        canonical_query,
        unix_secs
    )
}

/// Generate a base64 HMAC-SHA256 signature of `message` keyed with `secret`.
pub fn sign_request(message: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Produces authorization headers bound to one endpoint path.
#[derive(Clone)]
pub struct Signer {
    credentials: Credentials,
    path: String,
    clock: Arc<dyn Clock>,
}

impl Signer {
    pub fn new(credentials: Credentials, path: impl Into<String>) -> Self {
        Self {
            credentials,
            path: path.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Sign a request at the clock's current time.
    pub fn sign<I, K, V>(&self, method: &str, params: I) -> Result<AuthorizationHeader, SigningError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.sign_at(method, params, self.clock.now().timestamp())
    }

    fn sign_at<I, K, V>(
        &self,
        method: &str,
        params: I,
        unix_secs: i64,
    ) -> Result<AuthorizationHeader, SigningError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if !self.credentials.is_complete() {
            return Err(SigningError::MissingCredentials);
        }
        if method.trim().is_empty() {
            return Err(SigningError::InvalidMethod);
        }

        let query = canonical_query(params);
        let message = string_to_sign(method.trim(), &self.path, &query, unix_secs);
        let signature = sign_request(&message, self.credentials.secret_key());

        Ok(AuthorizationHeader(format!(
            "{} {}:{}:{}",
            AUTH_SCHEME,
            self.credentials.public_token(),
            unix_secs,
            signature
        )))
    }

    /// Check a header produced by a signer holding the same credentials.
    ///
    /// The signing time is taken from the header itself; freshness is the
    /// server's concern.
    pub fn verify<I, K, V>(&self, method: &str, params: I, header: &str) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let Some(unix_secs) = parse_header(header).map(|(_, ts, _)| ts) else {
            return false;
        };
        match self.sign_at(method, params, unix_secs) {
            Ok(expected) => constant_time_eq(expected.as_str().as_bytes(), header.as_bytes()),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("credentials", &self.credentials)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Split a header value into `(public_token, unix_secs, signature)`.
pub fn parse_header(header: &str) -> Option<(&str, i64, &str)> {
    let rest = header.strip_prefix(AUTH_SCHEME)?.strip_prefix(' ')?;
    let mut parts = rest.rsplitn(3, ':');
    let signature = parts.next()?;
    let unix_secs = parts.next()?.parse().ok()?;
    let public_token = parts.next()?;
    Some((public_token, unix_secs, signature))
}

/// Constant-time byte comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
