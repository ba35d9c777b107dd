use super::{
    clamp_int, enumerated_property, numeric_property, render_cached, Capability,
    CapabilityCache, Descriptor, Properties, Synthesizer, SynthesizerFactory,
};
use crate::cache;
use crate::error::SynthError;
use crate::process;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "piper";

pub const MIN_RATE: i64 = 80;
pub const MAX_RATE: i64 = 390;
pub const DEFAULT_RATE: i64 = 200;

pub struct PiperFactory {
    binary_path: String,
    models_dir: PathBuf,
    default_voice: String,
    timeout: Duration,
    capabilities: CapabilityCache,
}

impl PiperFactory {
    pub fn new(
        binary_path: String,
        models_dir: PathBuf,
        default_voice: String,
        timeout: Duration,
    ) -> Self {
        Self {
            binary_path,
            models_dir,
            default_voice,
            timeout,
            capabilities: CapabilityCache::new(),
        }
    }

    /// Voices are the `*.onnx` models that have a matching `.onnx.json`.
    pub fn list_voices(&self) -> Vec<String> {
        let mut voices = Vec::new();

        if let Ok(entries) = std::fs::read_dir(&self.models_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("onnx") {
                    continue;
                }
                let Some(file_stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if path.with_extension("onnx.json").exists() {
                    voices.push(file_stem.to_string());
                }
            }
        }

        voices.sort();
        voices
    }

    fn model_path(&self, voice_id: &str) -> PathBuf {
        self.models_dir.join(format!("{}.onnx", voice_id))
    }

    fn describe(&self) -> Result<Descriptor, SynthError> {
        let values = self.list_voices();
        let default = if values.contains(&self.default_voice) {
            self.default_voice.clone()
        } else {
            values.first().cloned().ok_or_else(|| {
                SynthError::Synthesis(format!(
                    "no piper voices installed in {}",
                    self.models_dir.display()
                ))
            })?
        };

        let capabilities = BTreeMap::from([
            (
                "rate".to_string(),
                Capability::Range {
                    minimum: MIN_RATE as f64,
                    maximum: MAX_RATE as f64,
                    default: DEFAULT_RATE as f64,
                },
            ),
            (
                "voice".to_string(),
                Capability::Enumeration { values, default },
            ),
        ]);

        Ok(Descriptor {
            name: NAME.to_string(),
            capabilities,
        })
    }
}

impl SynthesizerFactory for PiperFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn probe(&self) -> Result<(), SynthError> {
        process::run(&self.binary_path, &["--help".to_string()], None, self.timeout)?;
        self.capabilities().map(|_| ())
    }

    fn capabilities(&self) -> Result<Arc<Descriptor>, SynthError> {
        self.capabilities.get_or_try_init(|| self.describe())
    }

    fn construct(
        &self,
        cache_dir: &Path,
        properties: &Properties,
    ) -> Result<Box<dyn Synthesizer>, SynthError> {
        let rate = numeric_property(properties, "rate")?
            .map(|r| clamp_int(r, MIN_RATE, MAX_RATE))
            .unwrap_or(DEFAULT_RATE);
        let voice = match enumerated_property(properties, "voice", || self.capabilities())? {
            Some(voice) => voice,
            None => match self.capabilities()?.capabilities.get("voice") {
                Some(Capability::Enumeration { default, .. }) => default.clone(),
                _ => self.default_voice.clone(),
            },
        };

        let options = vec![rate.to_string(), voice.clone()];
        Ok(Box::new(PiperSynth {
            binary_path: self.binary_path.clone(),
            model: self.model_path(&voice),
            timeout: self.timeout,
            cache_dir: cache_dir.to_path_buf(),
            param_hash: cache::param_hash(NAME, &options),
            rate,
        }))
    }
}

pub struct PiperSynth {
    binary_path: String,
    model: PathBuf,
    timeout: Duration,
    cache_dir: PathBuf,
    param_hash: String,
    rate: i64,
}

/// Piper has no words-per-minute knob; `length_scale` stretches phoneme
/// durations, 1.0 being its natural speed (about 200 wpm).
pub fn length_scale(rate: i64) -> f64 {
    DEFAULT_RATE as f64 / rate as f64
}

impl PiperSynth {
    fn args(&self, out: &Path) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.model.to_string_lossy().into_owned(),
            "--length_scale".to_string(),
            format!("{:.3}", length_scale(self.rate)),
            "--output_file".to_string(),
            out.to_string_lossy().into_owned(),
        ]
    }
}

impl Synthesizer for PiperSynth {
    fn param_hash(&self) -> &str {
        &self.param_hash
    }

    fn render(&self, text: &str) -> Result<String, SynthError> {
        render_cached(&self.cache_dir, &self.param_hash, text, |out| {
            let input = format!("{}\n", text);
            process::run(&self.binary_path, &self.args(out), Some(&input), self.timeout)
                .map(|_| ())
        })
    }
}
