//! Build meta-data, kept for the lifetime of one invocation

use std::collections::HashMap;
use std::sync::Mutex;

use super::lock;

#[derive(Debug, Default)]
pub struct MetaDataStore {
    values: Mutex<HashMap<String, String>>,
}

impl MetaDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        tracing::debug!("Meta-data set: {}", key);
        lock(&self.values).insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    pub fn exists(&self, key: &str) -> bool {
        lock(&self.values).contains_key(key)
    }
}
