//! Validates client requests and hands them to the worker pool.

use crate::backends::{Descriptor, Properties};
use crate::encoder::{normalize_format, EncoderRegistry};
use crate::error::{SynthError, ValidationError};
use crate::job::{Job, JobResult};
use crate::pool::WorkerPool;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_ENGINE: &str = "espeak";
pub const DEFAULT_FORMAT: &str = ".ogg";

fn default_engine() -> String {
    DEFAULT_ENGINE.to_string()
}

fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

/// Body of `POST /synth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthRequest {
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_format")]
    pub format: String,
    pub utterances: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: Properties,
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    encoders: Arc<EncoderRegistry>,
    pool: Arc<WorkerPool>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, encoders: Arc<EncoderRegistry>, pool: Arc<WorkerPool>) -> Self {
        Self {
            registry,
            encoders,
            pool,
        }
    }

    /// Checks engine and format without touching the pool.
    pub fn validate(&self, request: SynthRequest) -> Result<Job, ValidationError> {
        if self.registry.lookup(&request.engine).is_none() {
            return Err(ValidationError::UnknownEngine);
        }
        if self.encoders.lookup(&request.format).is_none() {
            return Err(ValidationError::UnknownEncoder);
        }
        Ok(Job {
            engine: request.engine,
            format: normalize_format(&request.format),
            utterances: request.utterances,
            properties: request.properties,
        })
    }

    pub async fn submit(&self, request: SynthRequest) -> JobResult {
        let job = match self.validate(request) {
            Ok(job) => job,
            Err(e) => {
                debug!(error = %e, "request rejected");
                return JobResult::failure(e.to_string());
            }
        };

        match self.pool.submit(job).await {
            Ok(result) => result,
            Err(_) => {
                warn!("worker dropped a job without answering");
                JobResult::failure(SynthError::Worker("no result".to_string()).to_string())
            }
        }
    }

    pub fn engines(&self) -> Vec<String> {
        self.registry.list_available()
    }

    /// Capability descriptor for `name`. The query may spawn the engine, so
    /// it runs on the blocking pool.
    pub async fn engine_info(&self, name: &str) -> Result<Arc<Descriptor>, SynthError> {
        let factory = self
            .registry
            .lookup(name)
            .ok_or(ValidationError::InvalidEngine)?;
        tokio::task::spawn_blocking(move || factory.capabilities())
            .await
            .map_err(|e| SynthError::Worker(e.to_string()))?
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
