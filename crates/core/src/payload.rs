// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result submission payloads and their validation.
//!
//! Clients submit results either form-encoded (every value is a string) or
//! as JSON objects (numbers may be numbers). [`ResultPayload`] accepts both
//! shapes; [`ResultPayload::validate`] turns it into a [`ValidatedResult`]
//! or a [`Error::Validation`] naming the offending key. Nothing is written
//! before validation succeeds.

use crate::error::{Error, Result};
use crate::model::{BenchmarkSpec, DataType, Quartiles};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Keys every submission must carry with a non-empty value.
pub const REQUIRED_KEYS: [&str; 7] = [
    "commitid",
    "branch",
    "project",
    "executable",
    "benchmark",
    "environment",
    "result_value",
];

/// A scalar that may arrive as a JSON number, boolean or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Scalar {
    fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
        }
    }

    fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

/// One submitted result, as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub project: Option<Scalar>,
    pub branch: Option<Scalar>,
    pub commitid: Option<Scalar>,
    pub executable: Option<Scalar>,
    pub environment: Option<Scalar>,
    pub benchmark: Option<Scalar>,
    pub result_value: Option<Scalar>,
    pub std_dev: Option<Scalar>,
    pub min: Option<Scalar>,
    pub max: Option<Scalar>,
    pub q1: Option<Scalar>,
    pub q3: Option<Scalar>,
    pub revision_date: Option<Scalar>,
    pub result_date: Option<Scalar>,
    pub units: Option<Scalar>,
    pub units_title: Option<Scalar>,
    pub lessisbetter: Option<Scalar>,
    pub description: Option<Scalar>,
    pub data_type: Option<Scalar>,
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedResult {
    pub project: String,
    pub branch: String,
    pub commitid: String,
    pub executable: String,
    pub environment: String,
    pub benchmark: BenchmarkSpec,
    pub value: f64,
    pub std_dev: Option<f64>,
    pub quartiles: Option<Quartiles>,
    pub revision_date: Option<DateTime<Utc>>,
    pub result_date: Option<DateTime<Utc>>,
}

impl ResultPayload {
    fn field(&self, key: &str) -> Option<&Scalar> {
        match key {
            "project" => self.project.as_ref(),
            "branch" => self.branch.as_ref(),
            "commitid" => self.commitid.as_ref(),
            "executable" => self.executable.as_ref(),
            "environment" => self.environment.as_ref(),
            "benchmark" => self.benchmark.as_ref(),
            "result_value" => self.result_value.as_ref(),
            _ => None,
        }
    }

    fn required(&self, key: &str) -> Result<&Scalar> {
        let value = self
            .field(key)
            .ok_or_else(|| Error::validation(format!("Key '{}' missing from request", key)))?;
        if value.is_blank() {
            return Err(Error::validation(format!(
                "Value for key '{}' empty in request",
                key
            )));
        }
        Ok(value)
    }

    /// Check shape and types without touching storage.
    pub fn validate(&self) -> Result<ValidatedResult> {
        for key in REQUIRED_KEYS {
            self.required(key)?;
        }

        let text = |key: &str| -> Result<String> { Ok(self.required(key)?.as_text()) };

        let value = finite_number("result_value", self.required("result_value")?)?;
        let std_dev = optional_number("std_dev", self.std_dev.as_ref())?;

        let stats = [
            optional_number("min", self.min.as_ref())?,
            optional_number("q1", self.q1.as_ref())?,
            optional_number("q3", self.q3.as_ref())?,
            optional_number("max", self.max.as_ref())?,
        ];
        let has_stats = stats.iter().any(Option::is_some);
        let quartiles = match stats {
            [Some(min), Some(q1), Some(q3), Some(max)] => {
                let q = Quartiles { min, q1, q3, max };
                if q.is_ordered() {
                    Some(q)
                } else {
                    warn!(
                        min, q1, q3, max,
                        "Statistics are not in non-decreasing order, defaulting to result value"
                    );
                    None
                }
            }
            _ => None,
        };

        let mut benchmark = BenchmarkSpec::named(text("benchmark")?);
        if let Some(units) = non_blank(self.units.as_ref()) {
            benchmark.units = units;
        }
        if let Some(units_title) = non_blank(self.units_title.as_ref()) {
            benchmark.units_title = units_title;
        }
        if let Some(description) = non_blank(self.description.as_ref()) {
            benchmark.description = description;
        }
        if let Some(raw) = self.lessisbetter.as_ref().filter(|s| !s.is_blank()) {
            benchmark.lessisbetter = raw.as_bool().ok_or_else(|| {
                Error::validation(format!(
                    "Value for key 'lessisbetter' is not a boolean: '{}'",
                    raw.as_text()
                ))
            })?;
        }
        benchmark.data_type = match non_blank(self.data_type.as_ref()) {
            Some(code) => code.parse()?,
            None if has_stats => DataType::MultiSample,
            None => DataType::SingleValue,
        };

        Ok(ValidatedResult {
            project: text("project")?,
            branch: text("branch")?,
            commitid: text("commitid")?,
            executable: text("executable")?,
            environment: text("environment")?,
            benchmark,
            value,
            std_dev,
            quartiles,
            revision_date: optional_date("revision_date", self.revision_date.as_ref())?,
            result_date: optional_date("result_date", self.result_date.as_ref())?,
        })
    }
}

fn non_blank(value: Option<&Scalar>) -> Option<String> {
    value.filter(|s| !s.is_blank()).map(Scalar::as_text)
}

fn finite_number(key: &str, raw: &Scalar) -> Result<f64> {
    match raw.as_f64() {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(Error::validation(format!(
            "Value for key '{}' is not a number: '{}'",
            key,
            raw.as_text()
        ))),
    }
}

fn optional_number(key: &str, raw: Option<&Scalar>) -> Result<Option<f64>> {
    match raw.filter(|s| !s.is_blank()) {
        Some(raw) => finite_number(key, raw).map(Some),
        None => Ok(None),
    }
}

fn optional_date(key: &str, raw: Option<&Scalar>) -> Result<Option<DateTime<Utc>>> {
    match raw.filter(|s| !s.is_blank()) {
        Some(raw) => parse_date(&raw.as_text()).map(Some).ok_or_else(|| {
            Error::validation(format!(
                "Value for key '{}' is not a valid date: '{}'",
                key,
                raw.as_text()
            ))
        }),
        None => Ok(None),
    }
}

/// Parse the date formats clients send, truncated to whole seconds.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (UTC) and `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|n| n.and_utc())
        })?;
    Some(parsed.trunc_subsecs(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn text(s: &str) -> Option<Scalar> {
        Some(Scalar::Text(s.to_string()))
    }

    fn complete() -> ResultPayload {
        ResultPayload {
            project: text("MyProject"),
            branch: text("default"),
            commitid: text("abc123"),
            executable: text("myexe O3 64bits"),
            environment: text("Dual Core"),
            benchmark: text("float"),
            result_value: text("456.0"),
            ..ResultPayload::default()
        }
    }

    #[test]
    fn test_complete_payload_validates() {
        let valid = complete().validate().unwrap();
        assert_eq!(valid.project, "MyProject");
        assert_eq!(valid.value, 456.0);
        assert_eq!(valid.benchmark.data_type, DataType::SingleValue);
        assert!(valid.benchmark.lessisbetter);
        assert!(valid.quartiles.is_none());
    }

    #[test]
    fn test_missing_key() {
        let mut payload = complete();
        payload.environment = None;
        let err = payload.validate().unwrap_err();
        assert_eq!(err.to_string(), "Key 'environment' missing from request");
    }

    #[test]
    fn test_empty_value() {
        let mut payload = complete();
        payload.commitid = text("  ");
        let err = payload.validate().unwrap_err();
        assert_eq!(err.to_string(), "Value for key 'commitid' empty in request");
    }

    #[test]
    fn test_non_numeric_value() {
        let mut payload = complete();
        payload.result_value = text("fast");
        let err = payload.validate().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("result_value"));
    }

    #[test]
    fn test_infinite_value_rejected() {
        let mut payload = complete();
        payload.result_value = text("inf");
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_ordered_quartiles_kept() {
        let mut payload = complete();
        payload.min = Some(Scalar::Number(1.0));
        payload.q1 = Some(Scalar::Number(2.0));
        payload.q3 = Some(Scalar::Number(3.0));
        payload.max = Some(Scalar::Number(4.0));
        let valid = payload.validate().unwrap();
        assert_eq!(
            valid.quartiles,
            Some(Quartiles { min: 1.0, q1: 2.0, q3: 3.0, max: 4.0 })
        );
        assert_eq!(valid.benchmark.data_type, DataType::MultiSample);
    }

    #[test]
    fn test_unordered_quartiles_default() {
        let mut payload = complete();
        payload.min = text("5");
        payload.q1 = text("2");
        payload.q3 = text("3");
        payload.max = text("4");
        let valid = payload.validate().unwrap();
        assert!(valid.quartiles.is_none());
        assert_eq!(valid.value, 456.0);
    }

    #[test]
    fn test_partial_quartiles_default() {
        let mut payload = complete();
        payload.min = text("1");
        let valid = payload.validate().unwrap();
        assert!(valid.quartiles.is_none());
    }

    #[test]
    fn test_lessisbetter_parsing() {
        let mut payload = complete();
        payload.lessisbetter = text("False");
        assert!(!payload.validate().unwrap().benchmark.lessisbetter);

        payload.lessisbetter = text("maybe");
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_dates() {
        let expected = Utc.with_ymd_and_hms(2011, 5, 5, 3, 1, 45).unwrap();
        assert_eq!(parse_date("2011-05-05 03:01:45"), Some(expected));
        assert_eq!(parse_date("2011-05-05 03:01:45.123"), Some(expected));
        assert_eq!(parse_date("2011-05-05T03:01:45Z"), Some(expected));
        assert_eq!(
            parse_date("2011-05-05"),
            Some(Utc.with_ymd_and_hms(2011, 5, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("yesterday"), None);

        let mut payload = complete();
        payload.revision_date = text("not a date");
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_json_numbers_accepted() {
        let payload: ResultPayload = serde_json::from_value(serde_json::json!({
            "project": "MyProject",
            "branch": "default",
            "commitid": 42,
            "executable": "exe",
            "environment": "env",
            "benchmark": "float",
            "result_value": 1.5,
            "lessisbetter": false
        }))
        .unwrap();
        let valid = payload.validate().unwrap();
        assert_eq!(valid.commitid, "42");
        assert_eq!(valid.value, 1.5);
        assert!(!valid.benchmark.lessisbetter);
    }

    #[test]
    fn test_form_encoded_payload() {
        let payload: ResultPayload = serde_urlencoded::from_str(
            "project=P&branch=b&commitid=c1&executable=e&environment=v&benchmark=x&result_value=2.5&std_dev=0.1",
        )
        .unwrap();
        let valid = payload.validate().unwrap();
        assert_eq!(valid.value, 2.5);
        assert_eq!(valid.std_dev, Some(0.1));
    }
}
