//! Decoding validated parameters into typed destinations.
//!
//! Field correspondence follows serde: a destination field matches the
//! mapping key equal to its serde name, so `#[serde(rename = "...")]` is the
//! same tag that governs the wire format. Temporal values arrive from
//! validation as strings; the [`datetime`], [`datetime_opt`] and [`date`]
//! modules are the coercion hooks that turn them into `chrono` types, trying
//! every entry of [`TIME_FORMATS`] in order.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDateTime;
//! use param_bind::{decode, ParamMap};
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Deserialize)]
//! struct Slide {
//!     name: String,
//!     #[serde(rename = "ctime", with = "param_bind::decode::datetime")]
//!     created: NaiveDateTime,
//! }
//!
//! let mut map = ParamMap::new();
//! map.insert("name".into(), json!("intro"));
//! map.insert("ctime".into(), json!("2024-03-01"));
//!
//! let slide: Slide = decode::decode(map).unwrap();
//! assert_eq!(slide.name, "intro");
//! assert_eq!(slide.created.to_string(), "2024-03-01 00:00:00");
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::collector::ParamMap;
use crate::error::DecodeError;

/// Textual format of a full timestamp, e.g. `2024-03-01 10:20:30`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Textual format of a calendar date, e.g. `2024-03-01`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Formats tried, in order, when coercing a string into a timestamp.
pub const TIME_FORMATS: [&str; 2] = [DATETIME_FORMAT, DATE_FORMAT];

/// Decodes a validated mapping into `T`.
///
/// # Errors
///
/// Returns `DecodeError` when a value cannot be coerced into the matching
/// field's type, a required field is absent, or `T` is not a structured type
/// that can be built from a map.
pub fn decode<T: DeserializeOwned>(params: ParamMap) -> Result<T, DecodeError> {
    serde_json::from_value(Value::Object(params)).map_err(DecodeError::from)
}

/// Parses a timestamp using the first matching entry of [`TIME_FORMATS`].
///
/// A bare date yields midnight of that day.
///
/// # Errors
///
/// Returns `DecodeError::Time` if no format matches.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, DecodeError> {
    let input = input.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(input, DATETIME_FORMAT) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(input, DATE_FORMAT)
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| DecodeError::Time {
            expected: TIME_FORMATS.join(" or "),
        })
}

/// Parses a date, accepting either entry of [`TIME_FORMATS`] (the time part
/// of a full timestamp is discarded).
///
/// # Errors
///
/// Returns `DecodeError::Time` if no format matches.
pub fn parse_date(input: &str) -> Result<NaiveDate, DecodeError> {
    parse_datetime(input).map(|ts| ts.date())
}

/// Serde hook for `NaiveDateTime` fields written as strings.
pub mod datetime {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::DATETIME_FORMAT;

    /// Deserializes using [`parse_datetime`](super::parse_datetime).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::parse_datetime(&text).map_err(de::Error::custom)
    }

    /// Serializes as `YYYY-MM-DD HH:MM:SS`.
    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(DATETIME_FORMAT))
    }
}

/// Serde hook for `Option<NaiveDateTime>` fields written as strings.
///
/// Pair with `#[serde(default)]` so an absent field decodes to `None`.
pub mod datetime_opt {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::DATETIME_FORMAT;

    /// Deserializes `null`/absent as `None`, anything else via
    /// [`parse_datetime`](super::parse_datetime).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|text| super::parse_datetime(&text).map_err(de::Error::custom))
            .transpose()
    }

    /// Serializes as `YYYY-MM-DD HH:MM:SS` or `null`.
    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.collect_str(&ts.format(DATETIME_FORMAT)),
            None => serializer.serialize_none(),
        }
    }
}

/// Serde hook for `NaiveDate` fields written as strings.
pub mod date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::DATE_FORMAT;

    /// Deserializes using [`parse_date`](super::parse_date).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::parse_date(&text).map_err(de::Error::custom)
    }

    /// Serializes as `YYYY-MM-DD`.
    pub fn serialize<S>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(DATE_FORMAT))
    }
}
