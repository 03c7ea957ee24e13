//! History API data structures

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::error::{HistoryError, HistoryResult};

pub const PARAM_TIMESTAMP_FROM: &str = "timestamp_from";
pub const PARAM_TIMESTAMP_TO: &str = "timestamp_to";

/// One payment history entry.
///
/// Values are transported verbatim; the client does not interpret amounts or
/// statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryRecord {
    pub id: String,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl HistoryRecord {
    pub fn new(id: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            amount: amount.into(),
            currency: None,
            status: None,
            created_at: None,
            description: None,
            reference: None,
        }
    }
}

/// Parse a 200 response body. Only a JSON array of records is accepted.
pub fn parse_records(body: &str) -> HistoryResult<Vec<HistoryRecord>> {
    Ok(serde_json::from_str(body)?)
}

/// A window bound as handed in by the caller.
///
/// Typed instants are always valid and keep their offset; raw strings must be
/// RFC 3339 and are sent exactly as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    At(DateTime<FixedOffset>),
    Raw(String),
}

impl Timestamp {
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(dt) => Some(dt.with_timezone(&Utc)),
            Self::Raw(raw) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// Query-string value, or `None` when a raw value is not RFC 3339.
    pub fn wire_value(&self) -> Option<String> {
        match self {
            Self::At(dt) => Some(encode_timestamp(dt)),
            Self::Raw(raw) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|_| raw.clone()),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::At(dt.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self::At(dt)
    }
}

/// Naive values are taken to be UTC.
impl From<NaiveDateTime> for Timestamp {
    fn from(dt: NaiveDateTime) -> Self {
        Self::At(dt.and_utc().fixed_offset())
    }
}

impl From<&str> for Timestamp {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

impl From<String> for Timestamp {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

/// Wire encoding of a typed bound: RFC 3339, offset kept, fractional seconds
/// only when present (`2024-01-31T00:00:00Z`, `2024-01-31T02:00:00.250+02:00`).
pub fn encode_timestamp(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Time window for a history fetch. Either side may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestWindow {
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

impl RequestWindow {
    pub fn new(from: Option<Timestamp>, to: Option<Timestamp>) -> Self {
        Self { from, to }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_from(mut self, from: impl Into<Timestamp>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<Timestamp>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Query parameters for the present bounds.
    ///
    /// Values are not reordered or normalised; ordering of `from` and `to` is
    /// left to the server.
    pub fn query_params(&self) -> HistoryResult<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        for (field, bound) in [
            (PARAM_TIMESTAMP_FROM, &self.from),
            (PARAM_TIMESTAMP_TO, &self.to),
        ] {
            if let Some(ts) = bound {
                let value = ts
                    .wire_value()
                    .ok_or(HistoryError::InvalidArgument { field })?;
                params.insert(field.to_string(), value);
            }
        }
        Ok(params)
    }
}
