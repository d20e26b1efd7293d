//! The pluggable data-source contract (§4.6) and its reference adapters.
//!
//! The source system selects a backend by a `type` string through a dynamic
//! import registry; §9's design notes call for re-architecting that as a
//! constructor table instead, which is what [`registry`] provides.

mod date_predicate;
mod dummy;
mod echo;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::request::RequestData;

pub use dummy::DummyDataSource;
pub use echo::EchoDataSource;

/// A single data source's configuration entry within a collection (§6's
/// "Data source: `{type, match: {...}, ...type-specific fields}`" surface).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataSourceConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "match", default)]
    pub match_rules: HashMap<String, MatchRule>,
    #[serde(flatten)]
    pub options: Value,
}

/// A per-key match rule. The literal/list form requires every element of the
/// (already-coerced) request value to be one of the configured values; the date
/// form delegates to the specialised predicate semantics of §4.6.1.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MatchRule {
    DatePredicates(Vec<String>),
    Values(Vec<Value>),
}

/// Custom rather than derived: a list of bare strings is ambiguous between the
/// two variants on the wire, so this disambiguates the way `date_predicate`
/// already recognises predicate syntax — every element starting with `>`/`<`.
impl<'de> serde::Deserialize<'de> for MatchRule {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let is_predicate_list = !items.is_empty()
            && items.iter().all(|v| {
                v.as_str().is_some_and(|s| s.trim_start().starts_with('>') || s.trim_start().starts_with('<'))
            });
        if is_predicate_list {
            Ok(MatchRule::DatePredicates(
                items.into_iter().map(|v| v.as_str().unwrap().to_string()).collect(),
            ))
        } else {
            Ok(MatchRule::Values(items))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched,
    Mismatch(String),
}

/// The result of a single `dispatch` call. `succeeded = false` is not an error:
/// it means this data source tried and failed, and the caller should move on to
/// the next candidate (§4.5.1).
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub succeeded: bool,
    pub trace: String,
}

/// Abstract contract every pluggable backend implements (§4.6's table).
#[async_trait]
pub trait DataSource: Send + Sync {
    fn get_type(&self) -> &'static str;

    /// Pure predicate over the request; must be fast and side-effect free.
    async fn matches(&self, request: &RequestData, coerced: &Value) -> Result<MatchOutcome>;

    /// Performs the actual retrieve/archive work. Idempotent on failure.
    async fn dispatch(&self, request: &RequestData, input: Option<&[u8]>) -> Result<DispatchOutcome>;

    /// For RETRIEVE: the bytes produced by the most recent successful dispatch.
    async fn result(&self) -> Result<Vec<u8>>;

    /// Releases transient resources. Safe to call after any other method,
    /// including after a failed `dispatch`.
    async fn destroy(&self) -> Result<()>;

    fn mime_type(&self) -> &'static str;
}

/// Evaluates every configured rule against the coerced request payload,
/// returning the first mismatch found, or `Matched` if all rules hold.
pub fn evaluate_match_rules(rules: &HashMap<String, MatchRule>, coerced: &Value) -> Result<MatchOutcome> {
    for (key, rule) in rules {
        let Some(value) = coerced.get(key) else {
            return Ok(MatchOutcome::Mismatch(format!("request has no '{key}' field")));
        };
        let ok = match rule {
            MatchRule::Values(allowed) => values_satisfy(value, allowed),
            MatchRule::DatePredicates(predicates) => date_predicate::matches_any(predicates, value)?,
        };
        if !ok {
            return Ok(MatchOutcome::Mismatch(format!("'{key}' does not satisfy the configured match rule")));
        }
    }
    Ok(MatchOutcome::Matched)
}

fn values_satisfy(value: &Value, allowed: &[Value]) -> bool {
    match value {
        Value::Array(items) => items.iter().all(|item| allowed.contains(item)),
        other => allowed.contains(other),
    }
}

type Constructor = fn(&DataSourceConfig) -> Result<Box<dyn DataSource>>;

fn registry() -> HashMap<&'static str, Constructor> {
    let mut map: HashMap<&'static str, Constructor> = HashMap::new();
    map.insert("echo", |cfg| Ok(Box::new(EchoDataSource::new(cfg.clone()))));
    map.insert("dummy", |cfg| Ok(Box::new(DummyDataSource::new(cfg.clone()))));
    map
}

/// Instantiates the data source named by `config.kind`. Replaces the source
/// system's `importlib.import_module(type)` with a name→constructor lookup
/// fixed at build time (§9).
pub fn create_datasource(config: &DataSourceConfig) -> Result<Box<dyn DataSource>> {
    registry()
        .get(config.kind.as_str())
        .ok_or_else(|| Error::InvalidArgument(format!("unknown data source type '{}'", config.kind)))
        .and_then(|ctor| ctor(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluate_match_rules_rejects_missing_key() {
        let mut rules = HashMap::new();
        rules.insert("class".to_string(), MatchRule::Values(vec![json!("od")]));
        let outcome = evaluate_match_rules(&rules, &json!({})).unwrap();
        assert!(matches!(outcome, MatchOutcome::Mismatch(_)));
    }

    #[test]
    fn evaluate_match_rules_accepts_list_subset() {
        let mut rules = HashMap::new();
        rules.insert("class".to_string(), MatchRule::Values(vec![json!("od"), json!("rd")]));
        let outcome = evaluate_match_rules(&rules, &json!({"class": ["od", "rd"]})).unwrap();
        assert_eq!(outcome, MatchOutcome::Matched);
    }

    #[test]
    fn create_datasource_rejects_unknown_type() {
        let config = DataSourceConfig {
            kind: "nonexistent".to_string(),
            match_rules: HashMap::new(),
            options: json!({}),
        };
        assert!(create_datasource(&config).is_err());
    }
}
