#![allow(dead_code)]

use speechd_cache::backends::{
    clamp_int, numeric_property, render_cached, Capability, Descriptor, Properties, Synthesizer,
    SynthesizerFactory,
};
use speechd_cache::cache;
use speechd_cache::encoder::{EncoderKind, EncoderRegistry, KindFactory};
use speechd_cache::error::SynthError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stands in for espeak: same name, same rate limits, but writes a short
/// silent WAV instead of spawning anything.
pub struct FakeEngine {
    pub renders: Arc<AtomicUsize>,
    /// Highest number of renders seen running at the same time.
    pub peak: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    pub fail_on: Option<String>,
    pub delay: Duration,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            renders: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            fail_on: None,
            delay: Duration::ZERO,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn active(&self) -> Arc<AtomicUsize> {
        self.active.clone()
    }

    pub fn failing_on(text: &str) -> Self {
        Self {
            fail_on: Some(text.to_string()),
            ..Self::new()
        }
    }
}

impl SynthesizerFactory for FakeEngine {
    fn name(&self) -> &str {
        "espeak"
    }

    fn probe(&self) -> Result<(), SynthError> {
        Ok(())
    }

    fn capabilities(&self) -> Result<Arc<Descriptor>, SynthError> {
        Ok(Arc::new(Descriptor {
            name: "espeak".to_string(),
            capabilities: BTreeMap::from([(
                "rate".to_string(),
                Capability::Range {
                    minimum: 80.0,
                    maximum: 390.0,
                    default: 200.0,
                },
            )]),
        }))
    }

    fn construct(
        &self,
        cache_dir: &Path,
        properties: &Properties,
    ) -> Result<Box<dyn Synthesizer>, SynthError> {
        let rate = numeric_property(properties, "rate")?
            .map(|r| clamp_int(r, 80, 390))
            .unwrap_or(200);
        Ok(Box::new(FakeSynth {
            cache_dir: cache_dir.to_path_buf(),
            param_hash: cache::param_hash("espeak", &[rate.to_string()]),
            renders: self.renders.clone(),
            peak: self.peak.clone(),
            active: self.active.clone(),
            fail_on: self.fail_on.clone(),
            delay: self.delay,
        }))
    }
}

pub struct FakeSynth {
    cache_dir: PathBuf,
    param_hash: String,
    renders: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    fail_on: Option<String>,
    delay: Duration,
}

impl Synthesizer for FakeSynth {
    fn param_hash(&self) -> &str {
        &self.param_hash
    }

    fn render(&self, text: &str) -> Result<String, SynthError> {
        render_cached(&self.cache_dir, &self.param_hash, text, |out| {
            self.renders.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.as_deref() == Some(text) {
                return Err(SynthError::Synthesis("espeak failed (exit status: 1)".to_string()));
            }
            write_silence(out)
        })
    }
}

pub fn write_silence(path: &Path) -> Result<(), SynthError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| SynthError::Synthesis(e.to_string()))?;
    for _ in 0..220 {
        writer
            .write_sample(0i16)
            .map_err(|e| SynthError::Synthesis(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| SynthError::Synthesis(e.to_string()))
}

/// Only the wav passthrough, so no encoder binary is needed.
pub fn wav_only() -> EncoderRegistry {
    EncoderRegistry::default().with_factory(Arc::new(KindFactory::new(
        EncoderKind::Wav,
        &Default::default(),
    )))
}
