//! Normalizes request field values before a [`crate::datasource::DataSource`] matches
//! against them: dates, times, numeric ranges, and list/range syntax all have more than
//! one valid spelling on the wire, and matching must compare normalized forms.
//!
//! Only keys with a registered coercer are touched; everything else passes through
//! unchanged (scalars) or joined with `/` (lists), matching the permissive behaviour of
//! the source this was distilled from.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

/// Keys allowed to use `A/to/B[/by/N]` range syntax.
const ALLOW_RANGES: &[&str] = &["number", "step", "date", "time"];

/// Keys allowed to use `A/B/C` list syntax.
const ALLOW_LISTS: &[&str] = &[
    "class", "stream", "type", "expver", "param", "number", "date", "step", "time",
];

/// Configurable knobs for the coercion pass. `number_allow_zero` defaults to `false`:
/// of the two variants this was distilled from, the configurable one is authoritative
/// and rejects `number=0` unless a deployment opts in.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct CoercionConfig {
    pub number_allow_zero: bool,
}

impl Default for CoercionConfig {
    fn default() -> Self {
        Self {
            number_allow_zero: false,
        }
    }
}

/// Normalizes every key of a user request object in place, returning a fresh object.
/// Non-object payloads (a bare string, number, or null) pass through as `{"data": <value>}`.
pub fn coerce(config: &CoercionConfig, request: &Value) -> Result<Value> {
    let Value::Object(map) = request else {
        let mut wrapped = serde_json::Map::new();
        wrapped.insert("data".to_string(), request.clone());
        return Ok(Value::Object(wrapped));
    };

    let mut out = serde_json::Map::new();
    let mut errors = Vec::new();

    for (key, value) in map {
        match coerce_value(config, key, value) {
            Ok(coerced) => {
                if let Value::Array(items) = &coerced {
                    let mut seen = std::collections::HashSet::new();
                    let mut dupes = std::collections::HashSet::new();
                    for item in items {
                        let repr = item.to_string();
                        if !seen.insert(repr.clone()) {
                            dupes.insert(repr);
                        }
                    }
                    if !dupes.is_empty() {
                        errors.push(format!(
                            "duplicate values found in list for key '{key}': {dupes:?}"
                        ));
                        continue;
                    }
                }
                out.insert(key.clone(), coerced);
            }
            Err(e) => errors.push(format!("{e} for key '{key}' with value '{value}'")),
        }
    }

    if !errors.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "errors in request:\n {}",
            errors.join("\n ")
        )));
    }

    Ok(Value::Object(out))
}

fn coerce_value(config: &CoercionConfig, key: &str, value: &Value) -> Result<Value> {
    let Some(coercer) = coercer_for(key) else {
        return Ok(match value {
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| Value::String(stringify(v))).collect())
            }
            other => other.clone(),
        });
    };

    if let Value::Array(items) = value {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(Value::String(coercer(config, item)?));
        }
        return Ok(Value::Array(out));
    }

    if let Value::String(s) = value {
        if s.contains("/to/") && ALLOW_RANGES.contains(&key) {
            return coerce_range(config, coercer, s);
        }
        if s.contains('/') && ALLOW_LISTS.contains(&key) {
            let mut out = Vec::new();
            for part in s.split('/') {
                out.push(Value::String(coercer(config, &Value::String(part.to_string()))?));
            }
            return Ok(Value::Array(out));
        }
    }

    Ok(Value::String(coercer(config, value)?))
}

fn coerce_range(config: &CoercionConfig, coercer: Coercer, original: &str) -> Result<Value> {
    let (start, tail) = original
        .split_once("/to/")
        .ok_or_else(|| Error::InvalidArgument("invalid range format".to_string()))?;
    let (end, suffix) = match tail.split_once("/by/") {
        Some((end, by)) => (end, format!("/by/{by}")),
        None => (tail, String::new()),
    };
    if end.is_empty() {
        return Err(Error::InvalidArgument("invalid range format".to_string()));
    }
    let start_c = coercer(config, &Value::String(start.to_string()))?;
    let end_c = coercer(config, &Value::String(end.to_string()))?;
    Ok(Value::String(format!("{start_c}/to/{end_c}{suffix}")))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

type Coercer = fn(&CoercionConfig, &Value) -> Result<String>;

fn coercer_for(key: &str) -> Option<Coercer> {
    let table: HashMap<&str, Coercer> = [
        ("date", coerce_date as Coercer),
        ("step", coerce_step as Coercer),
        ("number", coerce_number as Coercer),
        ("param", coerce_param as Coercer),
        ("time", coerce_time as Coercer),
        ("expver", coerce_expver as Coercer),
        ("model", coerce_ignore_case as Coercer),
        ("experiment", coerce_ignore_case as Coercer),
        ("activity", coerce_ignore_case as Coercer),
    ]
    .into_iter()
    .collect();
    table.get(key).copied()
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

pub fn coerce_date(_config: &CoercionConfig, value: &Value) -> Result<String> {
    if let Some(n) = value_as_i64(value) {
        if n > 0 {
            let date_str = n.to_string();
            return validate_yyyymmdd(&date_str).map(|_| date_str);
        }
        let target = Utc::now().date_naive() + Duration::days(n);
        return Ok(target.format("%Y%m%d").to_string());
    }

    if let Value::String(s) = value {
        let trimmed = s.trim();
        if validate_yyyymmdd(trimmed).is_ok() {
            return Ok(trimmed.to_string());
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(date.format("%Y%m%d").to_string());
        }
    }

    Err(Error::InvalidArgument(
        "invalid date format, expected YYYYMMDD or YYYY-MM-DD".to_string(),
    ))
}

fn validate_yyyymmdd(s: &str) -> Result<()> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .map(|_| ())
        .map_err(|_| Error::InvalidArgument("invalid date format, expected YYYYMMDD".to_string()))
}

fn is_valid_step(value: &str) -> bool {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    let unit_re = Regex::new(r"^\d+(\d*d)?(\d*h)?(\d*m)?(\d*s)?$").expect("static regex is valid");
    unit_re.is_match(value)
}

pub fn coerce_step(_config: &CoercionConfig, value: &Value) -> Result<String> {
    match value {
        Value::Number(n) => {
            let i = n
                .as_i64()
                .ok_or_else(|| Error::InvalidArgument("invalid step".to_string()))?;
            if i < 0 {
                Err(Error::InvalidArgument(
                    "step must be greater than or equal to 0".to_string(),
                ))
            } else {
                Ok(i.to_string())
            }
        }
        Value::String(s) => {
            if is_valid_step(s) {
                return Ok(s.clone());
            }
            let range_re = Regex::new(r"^(.*)-(.*)$").expect("static regex is valid");
            if let Some(caps) = range_re.captures(s) {
                let (a, b) = (&caps[1], &caps[2]);
                if is_valid_step(a) && is_valid_step(b) {
                    return Ok(s.clone());
                }
            }
            Err(Error::InvalidArgument(
                "invalid step format, expected integer, suffixed duration, or a range".to_string(),
            ))
        }
        _ => Err(Error::InvalidArgument(
            "invalid type for step, expected integer or string".to_string(),
        )),
    }
}

pub fn coerce_number(config: &CoercionConfig, value: &Value) -> Result<String> {
    let min = if config.number_allow_zero { 0 } else { 1 };
    match value {
        Value::Number(n) => {
            let i = n
                .as_i64()
                .ok_or_else(|| Error::InvalidArgument("invalid number".to_string()))?;
            if i < min {
                Err(Error::InvalidArgument(format!("number must be >= {min}")))
            } else {
                Ok(i.to_string())
            }
        }
        Value::String(s) => {
            let parsed: i64 = s
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("number must be >= {min}")))?;
            if parsed < min {
                Err(Error::InvalidArgument(format!("number must be >= {min}")))
            } else {
                Ok(s.clone())
            }
        }
        _ => Err(Error::InvalidArgument(
            "invalid type, expected integer or string".to_string(),
        )),
    }
}

pub fn coerce_param(_config: &CoercionConfig, value: &Value) -> Result<String> {
    match value {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        _ => Err(Error::InvalidArgument(
            "invalid param type, expected integer or string".to_string(),
        )),
    }
}

pub fn coerce_time(_config: &CoercionConfig, value: &Value) -> Result<String> {
    let bad = || Error::InvalidArgument("invalid time format, expected HHMM or HH".to_string());

    let (hour, minute) = match value {
        Value::Number(n) => {
            let v = n.as_i64().ok_or_else(bad)?;
            if v < 0 {
                return Err(bad());
            } else if v < 24 {
                (v, 0)
            } else if (100..=2359).contains(&v) {
                (v / 100, v % 100)
            } else {
                return Err(bad());
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Some((h, m)) = trimmed.split_once(':') {
                let hour: i64 = h.parse().map_err(|_| bad())?;
                let minute: i64 = m.parse().map_err(|_| bad())?;
                (hour, minute)
            } else if trimmed.chars().all(|c| c.is_ascii_digit()) {
                match trimmed.len() {
                    4 => (trimmed[..2].parse().map_err(|_| bad())?, trimmed[2..].parse().map_err(|_| bad())?),
                    1 | 2 => (trimmed.parse().map_err(|_| bad())?, 0),
                    _ => return Err(bad()),
                }
            } else {
                return Err(bad());
            }
        }
        _ => return Err(Error::InvalidArgument(
            "invalid type for time, expected string or integer".to_string(),
        )),
    };

    if !(0..=23).contains(&hour) || !(0..=59).contains(&minute) || minute != 0 {
        return Err(bad());
    }

    Ok(format!("{hour:02}{minute:02}"))
}

pub fn coerce_expver(_config: &CoercionConfig, value: &Value) -> Result<String> {
    match value {
        Value::Number(n) => {
            let v = n
                .as_i64()
                .ok_or_else(|| Error::InvalidArgument("expver must be an integer or string".to_string()))?;
            if (0..=9999).contains(&v) {
                Ok(format!("{v:0>4}"))
            } else {
                Err(Error::InvalidArgument(
                    "expver integer must be between 0 and 9999 inclusive".to_string(),
                ))
            }
        }
        Value::String(s) => {
            if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() {
                let v: i64 = s.trim_start_matches('0').parse().unwrap_or(0);
                if (0..=9999).contains(&v) {
                    Ok(format!("{v:0>4}"))
                } else {
                    Err(Error::InvalidArgument(
                        "expver integer string must represent a number between 0 and 9999 inclusive".to_string(),
                    ))
                }
            } else if s.chars().count() == 4 {
                Ok(s.clone())
            } else {
                Err(Error::InvalidArgument(
                    "expver string length must be 4 characters exactly".to_string(),
                ))
            }
        }
        _ => Err(Error::InvalidArgument(
            "expver must be an integer or a string".to_string(),
        )),
    }
}

pub fn coerce_ignore_case(_config: &CoercionConfig, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.to_lowercase()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::InvalidArgument(
            "invalid type, expected string".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg() -> CoercionConfig {
        CoercionConfig::default()
    }

    #[test]
    fn coerce_date_relative_and_absolute() {
        let today = Utc::now().date_naive().format("%Y%m%d").to_string();
        assert_eq!(coerce_date(&cfg(), &json!(0)).unwrap(), today);
        let yesterday = (Utc::now().date_naive() - Duration::days(1))
            .format("%Y%m%d")
            .to_string();
        assert_eq!(coerce_date(&cfg(), &json!(-1)).unwrap(), yesterday);
        assert_eq!(coerce_date(&cfg(), &json!("2024-06-01")).unwrap(), "20240601");
        assert!(coerce_date(&cfg(), &json!(20240631)).is_err());
    }

    #[test]
    fn coerce_expver_boundaries() {
        assert_eq!(coerce_expver(&cfg(), &json!(1)).unwrap(), "0001");
        assert!(coerce_expver(&cfg(), &json!(10000)).is_err());
        assert_eq!(coerce_expver(&cfg(), &json!("abcd")).unwrap(), "abcd");
        assert!(coerce_expver(&cfg(), &json!("abcde")).is_err());
    }

    #[test]
    fn coerce_time_boundaries() {
        assert!(coerce_time(&cfg(), &json!(24)).is_err());
        assert!(coerce_time(&cfg(), &json!(2401)).is_err());
        assert!(coerce_time(&cfg(), &json!("12:30")).is_err());
        assert_eq!(coerce_time(&cfg(), &json!("12:00")).unwrap(), "1200");
        assert_eq!(coerce_time(&cfg(), &json!(6)).unwrap(), "0600");
    }

    #[test]
    fn coerce_number_rejects_zero_by_default() {
        assert!(coerce_number(&cfg(), &json!(0)).is_err());
        let mut allow_zero = cfg();
        allow_zero.number_allow_zero = true;
        assert_eq!(coerce_number(&allow_zero, &json!(0)).unwrap(), "0");
    }

    #[test]
    fn coerce_is_idempotent() {
        let request = json!({"date": "2024-06-01", "model": "IFS", "param": 130});
        let once = coerce(&cfg(), &request).unwrap();
        let twice = coerce(&cfg(), &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn coerce_rejects_duplicate_list_values() {
        let request = json!({"param": "130/130/131"});
        assert!(coerce(&cfg(), &request).is_err());
    }

    #[test]
    fn coerce_range_preserves_by_suffix() {
        let request = json!({"date": "20240101/to/20240401/by/10"});
        let out = coerce(&cfg(), &request).unwrap();
        assert_eq!(out["date"], json!("20240101/to/20240401/by/10"));
    }

    #[test]
    fn coerce_list_splits_on_allowed_keys() {
        let request = json!({"param": "130/131/132"});
        let out = coerce(&cfg(), &request).unwrap();
        assert_eq!(out["param"], json!(["130", "131", "132"]));
    }
}
