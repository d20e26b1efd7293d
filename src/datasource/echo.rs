//! `echo`: a reference data source used purely as a test fixture (§10.5). A
//! RETRIEVE echoes `user_request` verbatim as UTF-8 bytes; an ARCHIVE stores
//! whatever input bytes it was given, so the pipeline can be exercised
//! end-to-end without a real external system.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::request::{RequestData, Verb};

use super::{evaluate_match_rules, DataSource, DataSourceConfig, DispatchOutcome, MatchOutcome};

pub struct EchoDataSource {
    config: DataSourceConfig,
    result: Mutex<Option<Vec<u8>>>,
}

impl EchoDataSource {
    pub fn new(config: DataSourceConfig) -> Self {
        Self {
            config,
            result: Mutex::new(None),
        }
    }
}

fn value_to_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.clone().into_bytes(),
        other => other.to_string().into_bytes(),
    }
}

#[async_trait]
impl DataSource for EchoDataSource {
    fn get_type(&self) -> &'static str {
        "echo"
    }

    async fn matches(&self, _request: &RequestData, coerced: &Value) -> Result<MatchOutcome> {
        evaluate_match_rules(&self.config.match_rules, coerced)
    }

    async fn dispatch(&self, request: &RequestData, input: Option<&[u8]>) -> Result<DispatchOutcome> {
        match request.verb {
            Verb::Retrieve => {
                let bytes = value_to_bytes(&request.user_request);
                let len = bytes.len();
                *self.result.lock() = Some(bytes);
                Ok(DispatchOutcome {
                    succeeded: true,
                    trace: format!("echo: retrieved {len} bytes"),
                })
            }
            Verb::Archive => {
                let bytes = input.unwrap_or_default().to_vec();
                let len = bytes.len();
                *self.result.lock() = Some(bytes);
                Ok(DispatchOutcome {
                    succeeded: true,
                    trace: format!("echo: archived {len} bytes"),
                })
            }
        }
    }

    async fn result(&self) -> Result<Vec<u8>> {
        self.result
            .lock()
            .clone()
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("echo: dispatch did not run before result()")))
    }

    async fn destroy(&self) -> Result<()> {
        self.result.lock().take();
        Ok(())
    }

    fn mime_type(&self) -> &'static str {
        "text"
    }
}
