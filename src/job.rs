//! One batch of utterances rendered with shared engine, format and
//! properties. A `Job` is plain data so it can be shipped to a worker
//! process as JSON; the `JobRunner` is everything a worker needs to run it.

use crate::backends::Properties;
use crate::encoder::EncoderRegistry;
use crate::error::{SynthError, ValidationError};
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub engine: String,
    pub format: String,
    pub utterances: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: Properties,
}

/// `{"success": true, "result": {...}}` or `{"success": false, "description": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl JobResult {
    pub fn ok(result: BTreeMap<String, String>) -> Self {
        Self {
            success: true,
            result: Some(result),
            description: None,
        }
    }

    pub fn failure(description: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            description: Some(description.into()),
        }
    }
}

impl From<Result<BTreeMap<String, String>, SynthError>> for JobResult {
    fn from(outcome: Result<BTreeMap<String, String>, SynthError>) -> Self {
        match outcome {
            Ok(result) => JobResult::ok(result),
            Err(e) => JobResult::failure(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<Registry>,
    encoders: Arc<EncoderRegistry>,
    cache_dir: PathBuf,
}

impl JobRunner {
    pub fn new(registry: Arc<Registry>, encoders: Arc<EncoderRegistry>, cache_dir: PathBuf) -> Self {
        Self {
            registry,
            encoders,
            cache_dir,
        }
    }

    /// Runs the whole batch, stopping at the first failure. Files already
    /// rendered for earlier utterances stay in the cache.
    pub fn run(&self, job: &Job) -> JobResult {
        let outcome = self.try_run(job);
        match &outcome {
            Ok(result) => info!(
                engine = %job.engine,
                format = %job.format,
                utterances = result.len(),
                "job complete"
            ),
            Err(e) => warn!(engine = %job.engine, format = %job.format, error = %e, "job failed"),
        }
        outcome.into()
    }

    fn try_run(&self, job: &Job) -> Result<BTreeMap<String, String>, SynthError> {
        let factory = self
            .registry
            .lookup(&job.engine)
            .ok_or(ValidationError::UnknownEngine)?;
        let encoder_factory = self
            .encoders
            .lookup(&job.format)
            .ok_or(ValidationError::UnknownEncoder)?;

        let synth = factory.construct(&self.cache_dir, &job.properties)?;
        let encoder = encoder_factory.construct(&self.cache_dir)?;

        let mut result = BTreeMap::new();
        for (id, text) in &job.utterances {
            let identity = synth.render(text)?;
            encoder.encode(&identity)?;
            result.insert(id.clone(), identity);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_wire_format() {
        let ok = JobResult::ok(BTreeMap::from([("a".to_string(), "x-y".to_string())]));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"success": true, "result": {"a": "x-y"}})
        );

        let failed = JobResult::failure("unknown speech engine");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"success": false, "description": "unknown speech engine"})
        );
    }

    #[test]
    fn test_job_properties_default_to_empty() {
        let job: Job = serde_json::from_value(json!({
            "engine": "espeak",
            "format": ".ogg",
            "utterances": {"a": "hello"}
        }))
        .unwrap();
        assert!(job.properties.is_empty());
    }

    #[test]
    fn test_unknown_engine_fails_without_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(
            Arc::new(Registry::empty()),
            Arc::new(EncoderRegistry::default()),
            dir.path().to_path_buf(),
        );
        let job = Job {
            engine: "nonexistent".to_string(),
            format: ".wav".to_string(),
            utterances: BTreeMap::from([("a".to_string(), "hello".to_string())]),
            properties: Properties::new(),
        };
        assert_eq!(runner.run(&job), JobResult::failure("unknown speech engine"));
    }
}
