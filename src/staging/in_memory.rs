//! In-memory reference implementation of `Staging`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{Error, Result};

use super::{ResourceInfo, Staging};

struct Object {
    data: Vec<u8>,
    content_type: String,
    last_modified: chrono::DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct InMemoryStaging {
    objects: Arc<RwLock<HashMap<String, Object>>>,
    url_prefix: String,
}

impl InMemoryStaging {
    pub fn new(url_prefix: impl Into<String>) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            url_prefix: url_prefix.into(),
        }
    }
}

#[async_trait]
impl Staging for InMemoryStaging {
    async fn create(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.objects.write().insert(
            key.to_string(),
            Object {
                data,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("staging object {key} not found")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("staging object {key} not found")))
    }

    async fn list(&self) -> Result<Vec<ResourceInfo>> {
        Ok(self
            .objects
            .read()
            .iter()
            .map(|(name, o)| ResourceInfo {
                name: name.clone(),
                size: o.data.len() as u64,
                content_type: o.content_type.clone(),
                last_modified: o.last_modified,
            })
            .collect())
    }

    async fn stat(&self, key: &str) -> Result<ResourceInfo> {
        self.objects
            .read()
            .get(key)
            .map(|o| ResourceInfo {
                name: key.to_string(),
                size: o.data.len() as u64,
                content_type: o.content_type.clone(),
                last_modified: o.last_modified,
            })
            .ok_or_else(|| Error::NotFound(format!("staging object {key} not found")))
    }

    async fn get_url(&self, key: &str) -> Result<String> {
        if !self.objects.read().contains_key(key) {
            return Err(Error::NotFound(format!("staging object {key} not found")));
        }
        Ok(format!("{}/{key}", self.url_prefix))
    }

    async fn wipe(&self) -> Result<()> {
        self.objects.write().clear();
        Ok(())
    }
}
