pub mod espeak;
pub mod piper;
pub mod say;

use crate::cache;
use crate::config_loader::Settings;
use crate::error::SynthError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Synthesis properties as submitted by a client, e.g. `{"rate": 250}`.
pub type Properties = serde_json::Map<String, Value>;

/// One property a backend understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Capability {
    Range {
        minimum: f64,
        maximum: f64,
        default: f64,
    },
    Enumeration {
        values: Vec<String>,
        default: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub capabilities: BTreeMap<String, Capability>,
}

impl Descriptor {
    pub fn allows(&self, property: &str, value: &str) -> bool {
        match self.capabilities.get(property) {
            Some(Capability::Enumeration { values, .. }) => values.iter().any(|v| v == value),
            _ => false,
        }
    }
}

/// Entry point for one speech engine: probes it, describes it, and builds
/// configured [`Synthesizer`]s from client properties.
pub trait SynthesizerFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Checks the engine is installed and working.
    fn probe(&self) -> Result<(), SynthError>;

    /// Supported properties. Computed at most once per factory.
    fn capabilities(&self) -> Result<Arc<Descriptor>, SynthError>;

    /// Validates and clamps `properties` into a synthesizer that writes into
    /// `cache_dir`. Fails with `SynthError::Parameter` on a bad value.
    fn construct(
        &self,
        cache_dir: &Path,
        properties: &Properties,
    ) -> Result<Box<dyn Synthesizer>, SynthError>;
}

/// A backend bound to one set of effective parameters.
pub trait Synthesizer: Send {
    /// Hash of the engine name and effective options.
    fn param_hash(&self) -> &str;

    /// Renders `text` to `<identity>.wav` in the cache and returns the
    /// identity. Never invokes the engine when that file already exists.
    fn render(&self, text: &str) -> Result<String, SynthError>;
}

/// The built-in engines, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Espeak,
    Piper,
    Say,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Espeak, EngineKind::Piper, EngineKind::Say];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Espeak => "espeak",
            EngineKind::Piper => "piper",
            EngineKind::Say => "say",
        }
    }

    pub fn factory(self, settings: &Settings) -> Arc<dyn SynthesizerFactory> {
        let timeout = Duration::from_secs(settings.engine_timeout_secs);
        match self {
            EngineKind::Espeak => Arc::new(espeak::EspeakFactory::new(
                settings.espeak_binary.clone(),
                timeout,
            )),
            EngineKind::Piper => Arc::new(piper::PiperFactory::new(
                settings.piper_binary.clone(),
                settings.piper_models_dir.clone(),
                settings.piper_default_voice.clone(),
                timeout,
            )),
            EngineKind::Say => Arc::new(say::SayFactory::new(settings.say_binary.clone(), timeout)),
        }
    }
}

/// Single-flight memo for a factory's capability query. The lock is held
/// while the query runs, so concurrent first callers wait for one result
/// instead of each spawning the engine.
#[derive(Default)]
pub struct CapabilityCache {
    slot: Mutex<Option<Arc<Descriptor>>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(descriptor: Descriptor) -> Self {
        Self {
            slot: Mutex::new(Some(Arc::new(descriptor))),
        }
    }

    pub fn get_or_try_init<F>(&self, query: F) -> Result<Arc<Descriptor>, SynthError>
    where
        F: FnOnce() -> Result<Descriptor, SynthError>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(descriptor) = slot.as_ref() {
            return Ok(descriptor.clone());
        }
        let descriptor = Arc::new(query()?);
        *slot = Some(descriptor.clone());
        Ok(descriptor)
    }
}

/// Reads a numeric property. Numbers and numeric strings are accepted;
/// anything else is `invalid <key>`. Absent keys yield `None`.
pub fn numeric_property(properties: &Properties, key: &str) -> Result<Option<f64>, SynthError> {
    match properties.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| SynthError::invalid(key)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| SynthError::invalid(key)),
        Some(_) => Err(SynthError::invalid(key)),
    }
}

/// Truncates toward zero and clamps into `[min, max]`.
pub fn clamp_int(value: f64, min: i64, max: i64) -> i64 {
    (value.trunc() as i64).clamp(min, max)
}

/// Reads an enumerated string property, checking it against the backend's
/// advertised values. The capability query only runs when a value is given.
pub fn enumerated_property<F>(
    properties: &Properties,
    key: &str,
    capabilities: F,
) -> Result<Option<String>, SynthError>
where
    F: FnOnce() -> Result<Arc<Descriptor>, SynthError>,
{
    match properties.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => {
            if capabilities()?.allows(key, value) {
                Ok(Some(value.clone()))
            } else {
                Err(SynthError::invalid(key))
            }
        }
        Some(_) => Err(SynthError::invalid(key)),
    }
}

/// Shared render path: resolves the identity, short-circuits on a cache hit,
/// and otherwise lets `engine` write to a temporary path that is checked to
/// hold real WAV audio before being published.
pub fn render_cached<F>(
    cache_dir: &Path,
    param_hash: &str,
    text: &str,
    engine: F,
) -> Result<String, SynthError>
where
    F: FnOnce(&Path) -> Result<(), SynthError>,
{
    let identity = cache::identity(&cache::content_hash(text), param_hash);
    let target = cache::artifact_path(cache_dir, &identity, cache::RAW_EXTENSION);

    if target.is_file() {
        debug!(%identity, "cache hit");
        return Ok(identity);
    }

    debug!(%identity, "cache miss, rendering");
    cache::publish(cache_dir, &target, |out| {
        engine(out)?;
        verify_wav(out)
    })?;
    Ok(identity)
}

fn verify_wav(path: &Path) -> Result<(), SynthError> {
    hound::WavReader::open(path)
        .map(|_| ())
        .map_err(|e| SynthError::Synthesis(format!("engine produced no usable audio: {}", e)))
}
