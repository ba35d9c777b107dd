//! Per-application cache-warming metrics. Clients post whatever usage data
//! they have; nothing here interprets it yet.

use crate::error::MetricsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    metrics: Value,
    updated_at: i64,
}

pub trait MetricsStore: Send + Sync {
    fn load(&self, app: &str) -> Result<Option<Value>, MetricsError>;
    fn record(&self, app: &str, metrics: &Value) -> Result<(), MetricsError>;
}

pub struct SledMetricsStore {
    db: sled::Db,
}

impl SledMetricsStore {
    pub fn open(path: &Path) -> Result<Self, MetricsError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl MetricsStore for SledMetricsStore {
    fn load(&self, app: &str) -> Result<Option<Value>, MetricsError> {
        match self.db.get(app.as_bytes())? {
            Some(bytes) => {
                let record: Record = serde_json::from_slice(&bytes)?;
                Ok(Some(record.metrics))
            }
            None => Ok(None),
        }
    }

    fn record(&self, app: &str, metrics: &Value) -> Result<(), MetricsError> {
        let record = Record {
            metrics: metrics.clone(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.db.insert(app.as_bytes(), serde_json::to_vec(&record)?)?;
        self.db.flush()?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMetricsStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MetricsStore for MemoryMetricsStore {
    fn load(&self, app: &str) -> Result<Option<Value>, MetricsError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(app).cloned())
    }

    fn record(&self, app: &str, metrics: &Value) -> Result<(), MetricsError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(app.to_string(), metrics.clone());
        Ok(())
    }
}
