//! Layered configuration: a YAML file merged with `BROKER_`-prefixed environment
//! overrides (§10.3).

use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::coercion::CoercionConfig;
use crate::collection::{Collection, CollectionLimits};
use crate::datasource::DataSourceConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-tenant request broker daemon")]
pub struct Args {
    /// Path to the configuration file.
    #[arg(short = 'f', long, env = "BROKER_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Load and validate the configuration, then exit without starting a daemon.
    #[arg(long)]
    pub validate: bool,

    /// Which daemon role to run.
    #[arg(long, value_enum, default_value = "all")]
    pub role: Role,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Runs the broker, worker, and GC together against one shared in-memory
    /// backend set. The only role that does anything useful with the in-memory
    /// reference backends, since they don't persist across processes.
    All,
    Broker,
    Worker,
    Gc,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerSettings {
    #[serde(with = "duration_seconds")]
    pub interval: Duration,
    pub max_queue_size: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        let defaults = crate::broker::BrokerConfig::default();
        Self {
            interval: defaults.interval,
            max_queue_size: defaults.max_queue_size,
        }
    }
}

impl From<BrokerSettings> for crate::broker::BrokerConfig {
    fn from(s: BrokerSettings) -> Self {
        Self {
            interval: s.interval,
            max_queue_size: s.max_queue_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSettings {
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    #[serde(with = "duration_seconds")]
    pub heartbeat_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let defaults = crate::worker::WorkerConfig::default();
        Self {
            poll_interval: defaults.poll_interval,
            heartbeat_interval: defaults.heartbeat_interval,
        }
    }
}

impl From<WorkerSettings> for crate::worker::WorkerConfig {
    fn from(s: WorkerSettings) -> Self {
        Self {
            poll_interval: s.poll_interval,
            heartbeat_interval: s.heartbeat_interval,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcSettings {
    #[serde(with = "duration_seconds")]
    pub interval: Duration,
    #[serde(with = "duration_seconds")]
    pub age: Duration,
    #[serde(with = "duration_seconds")]
    pub metric_age: Duration,
    pub threshold: String,
}

impl Default for GcSettings {
    fn default() -> Self {
        let defaults = crate::gc::GcConfig::default();
        Self {
            interval: defaults.interval,
            age: defaults.age,
            metric_age: defaults.metric_age,
            threshold: format!("{}", defaults.threshold_bytes),
        }
    }
}

impl TryFrom<GcSettings> for crate::gc::GcConfig {
    type Error = crate::error::Error;

    fn try_from(s: GcSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            interval: s.interval,
            age: s.age,
            metric_age: s.metric_age,
            threshold_bytes: parse_byte_threshold(&s.threshold)?,
        })
    }
}

/// `100`, `10K`, `10M`, `10G`, `10T` — case-insensitive, binary (1024-based)
/// multipliers, matching the reference stack's threshold syntax.
pub fn parse_byte_threshold(raw: &str) -> crate::error::Result<u64> {
    let trimmed = raw.trim();
    let (digits, multiplier) = match trimmed.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => {
            let multiplier = match c.to_ascii_uppercase() {
                'K' => 1024,
                'M' => 1024 * 1024,
                'G' => 1024 * 1024 * 1024,
                'T' => 1024 * 1024 * 1024 * 1024,
                other => {
                    return Err(crate::error::Error::InvalidArgument(format!(
                        "unknown size suffix '{other}' in threshold '{raw}'"
                    )))
                }
            };
            (&trimmed[..trimmed.len() - 1], multiplier)
        }
        _ => (trimmed, 1u64),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| crate::error::Error::InvalidArgument(format!("invalid byte threshold '{raw}'")))?;
    Ok(value * multiplier)
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CollectionSettings {
    pub datasources: Vec<DataSourceConfig>,
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub limits: CollectionLimitsSettings,
    #[serde(default)]
    pub coercion: CoercionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CollectionLimitsSettings {
    pub total: Option<usize>,
    pub per_user: Option<usize>,
    #[serde(default)]
    pub per_role: HashMap<String, HashMap<String, usize>>,
}

impl From<CollectionLimitsSettings> for CollectionLimits {
    fn from(s: CollectionLimitsSettings) -> Self {
        Self {
            total: s.total,
            per_user: s.per_user,
            per_role: s.per_role,
        }
    }
}

impl CollectionSettings {
    fn into_collection(self, name: String) -> Collection {
        Collection {
            name,
            datasources: self.datasources,
            roles: self.roles,
            limits: self.limits.into(),
            coercion: self.coercion,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub broker: BrokerSettings,
    pub worker: WorkerSettings,
    pub gc: GcSettings,
    pub collections: HashMap<String, CollectionSettings>,
}

impl Config {
    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("BROKER_").split("__"))
    }

    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Cross-field checks figment's schema validation can't express on its own.
    pub fn validate(&self) -> crate::error::Result<()> {
        parse_byte_threshold(&self.gc.threshold)?;
        for (name, settings) in &self.collections {
            if settings.datasources.is_empty() {
                return Err(crate::error::Error::InvalidArgument(format!(
                    "collection '{name}' has no data sources configured"
                )));
            }
        }
        Ok(())
    }

    pub fn collections(self) -> crate::error::Result<HashMap<String, Collection>> {
        self.validate()?;
        Ok(self
            .collections
            .into_iter()
            .map(|(name, settings)| {
                let collection = settings.into_collection(name.clone());
                (name, collection)
            })
            .collect())
    }
}

mod duration_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_suffixed_byte_thresholds() {
        assert_eq!(parse_byte_threshold("100").unwrap(), 100);
        assert_eq!(parse_byte_threshold("10K").unwrap(), 10 * 1024);
        assert_eq!(parse_byte_threshold("10G").unwrap(), 10 * 1024 * 1024 * 1024);
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert!(parse_byte_threshold("10X").is_err());
    }

    #[test]
    fn loads_config_from_yaml_with_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
broker:
  interval: "10s"
  max_queue_size: 50
gc:
  interval: "1h"
  age: "24h"
  metric_age: "168h"
  threshold: "5G"
collections:
  debug:
    datasources:
      - type: echo
"#,
            )?;
            jail.set_env("BROKER_BROKER__MAX_QUEUE_SIZE", "200");

            let args = Args {
                config: "config.yaml".to_string(),
                validate: false,
                role: Role::Broker,
            };
            let config = Config::load(&args).unwrap();
            assert_eq!(config.broker.max_queue_size, 200);
            assert_eq!(config.gc.threshold, "5G");
            assert!(config.collections.contains_key("debug"));
            Ok(())
        });
    }
}
