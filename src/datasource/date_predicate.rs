//! The specialised date-predicate match form (§4.6.1).
//!
//! A date rule is a disjunctive list of predicate strings (`"> 30d"`, `"< 2h"`).
//! Given an offset, `cutoff = now() - offset`; a single date passes `"> offset"`
//! iff strictly after cutoff, `"< offset"` iff strictly before. Ranges and
//! slash-separated lists require every element to satisfy the same predicate; a
//! native JSON array (from list coercion) is likewise satisfied only if every
//! element is.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    After,
    Before,
}

/// `predicates` is disjunctive: the date passes if any one of them holds.
pub fn matches_any(predicates: &[String], value: &Value) -> Result<bool> {
    for predicate in predicates {
        if matches_one(predicate, value)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn matches_one(predicate: &str, value: &Value) -> Result<bool> {
    let (cmp, offset_str) = parse_predicate(predicate)?;
    let offset = humantime::parse_duration(offset_str)
        .map_err(|e| Error::InvalidArgument(format!("invalid date predicate offset '{offset_str}': {e}")))?;
    let offset = chrono::Duration::from_std(offset)
        .map_err(|e| Error::InvalidArgument(format!("date predicate offset out of range: {e}")))?;
    let cutoff = Utc::now() - offset;
    value_satisfies(value, cmp, cutoff)
}

fn parse_predicate(predicate: &str) -> Result<(Cmp, &str)> {
    let predicate = predicate.trim();
    if let Some(rest) = predicate.strip_prefix('>') {
        Ok((Cmp::After, rest.trim()))
    } else if let Some(rest) = predicate.strip_prefix('<') {
        Ok((Cmp::Before, rest.trim()))
    } else {
        Err(Error::InvalidArgument(format!(
            "date predicate must start with '>' or '<': {predicate}"
        )))
    }
}

fn value_satisfies(value: &Value, cmp: Cmp, cutoff: DateTime<Utc>) -> Result<bool> {
    match value {
        Value::Array(items) => {
            for item in items {
                if !value_satisfies(item, cmp, cutoff)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Value::String(s) if s.contains("/to/") => {
            let (start, rest) = s.split_once("/to/").expect("checked contains");
            let end = rest.split("/by/").next().unwrap_or(rest);
            Ok(single_date_satisfies(start, cmp, cutoff)? && single_date_satisfies(end, cmp, cutoff)?)
        }
        Value::String(s) if s.contains('/') => {
            for part in s.split('/') {
                if !single_date_satisfies(part, cmp, cutoff)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Value::String(s) => single_date_satisfies(s, cmp, cutoff),
        other => Err(Error::InvalidArgument(format!(
            "date predicate cannot evaluate non-string value {other}"
        ))),
    }
}

fn single_date_satisfies(s: &str, cmp: Cmp, cutoff: DateTime<Utc>) -> Result<bool> {
    let date = NaiveDate::parse_from_str(s, "%Y%m%d")
        .map_err(|_| Error::InvalidArgument(format!("date '{s}' is not in YYYYMMDD form")))?;
    let as_datetime = Utc
        .from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is always valid"));
    Ok(match cmp {
        Cmp::After => as_datetime > cutoff,
        Cmp::Before => as_datetime < cutoff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thirty_days_prior_passes_greater_than_thirty_days() {
        let thirty_days_ago = (Utc::now() - chrono::Duration::days(31)).format("%Y%m%d").to_string();
        assert!(matches_any(&["> 30d".to_string()], &json!(thirty_days_ago)).unwrap());
    }

    #[test]
    fn recent_date_fails_greater_than_thirty_days() {
        let yesterday = (Utc::now() - chrono::Duration::days(1)).format("%Y%m%d").to_string();
        assert!(!matches_any(&["> 30d".to_string()], &json!(yesterday)).unwrap());
    }

    #[test]
    fn range_requires_both_endpoints_to_satisfy() {
        let old_start = (Utc::now() - chrono::Duration::days(40)).format("%Y%m%d").to_string();
        let old_end = (Utc::now() - chrono::Duration::days(35)).format("%Y%m%d").to_string();
        let range = format!("{old_start}/to/{old_end}");
        assert!(matches_any(&["> 30d".to_string()], &json!(range)).unwrap());
    }

    #[test]
    fn disjunctive_predicate_list_passes_if_any_matches() {
        let yesterday = (Utc::now() - chrono::Duration::days(1)).format("%Y%m%d").to_string();
        let predicates = vec!["> 30d".to_string(), "< 2d".to_string()];
        assert!(matches_any(&predicates, &json!(yesterday)).unwrap());
    }
}
