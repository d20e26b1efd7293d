//! `dummy`: a reference data source used purely as a test fixture (§10.5).
//! RETRIEVE generates `size` bytes of repeating filler, with `size` parsed from
//! `user_request`; ARCHIVE is not supported.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::request::{RequestData, Verb};

use super::{evaluate_match_rules, DataSource, DataSourceConfig, DispatchOutcome, MatchOutcome};

const FILLER: &[u8] = b"polytope";

pub struct DummyDataSource {
    config: DataSourceConfig,
    result: Mutex<Option<Vec<u8>>>,
}

impl DummyDataSource {
    pub fn new(config: DataSourceConfig) -> Self {
        Self {
            config,
            result: Mutex::new(None),
        }
    }
}

fn parse_size(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn filler(size: usize) -> Vec<u8> {
    FILLER.iter().copied().cycle().take(size).collect()
}

#[async_trait]
impl DataSource for DummyDataSource {
    fn get_type(&self) -> &'static str {
        "dummy"
    }

    async fn matches(&self, _request: &RequestData, coerced: &Value) -> Result<MatchOutcome> {
        evaluate_match_rules(&self.config.match_rules, coerced)
    }

    async fn dispatch(&self, request: &RequestData, _input: Option<&[u8]>) -> Result<DispatchOutcome> {
        match request.verb {
            Verb::Retrieve => {
                let Some(size) = parse_size(&request.user_request) else {
                    return Ok(DispatchOutcome {
                        succeeded: false,
                        trace: "dummy: user_request did not parse as an integer size".to_string(),
                    });
                };
                *self.result.lock() = Some(filler(size));
                Ok(DispatchOutcome {
                    succeeded: true,
                    trace: format!("dummy: generated {size} bytes"),
                })
            }
            Verb::Archive => Ok(DispatchOutcome {
                succeeded: false,
                trace: "dummy: archive is not supported".to_string(),
            }),
        }
    }

    async fn result(&self) -> Result<Vec<u8>> {
        self.result
            .lock()
            .clone()
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("dummy: dispatch did not run before result()")))
    }

    async fn destroy(&self) -> Result<()> {
        self.result.lock().take();
        Ok(())
    }

    fn mime_type(&self) -> &'static str {
        "application/octet-stream"
    }
}
