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

pub const NAME: &str = "espeak";

pub const MIN_RATE: i64 = 80;
pub const MAX_RATE: i64 = 390;
pub const DEFAULT_RATE: i64 = 200;
// espeak's own pitch scale; clients send 0.0-1.0
pub const MIN_PITCH: i64 = 0;
pub const MAX_PITCH: i64 = 99;
pub const DEFAULT_PITCH: i64 = 50;
pub const DEFAULT_VOICE: &str = "default";

const VARIANTS: [&str; 13] = [
    "", "+f1", "+f2", "+f3", "+f4", "+m1", "+m2", "+m3", "+m4", "+m5", "+m6", "+whisper",
    "+croak",
];

pub struct EspeakFactory {
    binary: String,
    timeout: Duration,
    capabilities: CapabilityCache,
}

impl EspeakFactory {
    pub fn new(binary: String, timeout: Duration) -> Self {
        Self {
            binary,
            timeout,
            capabilities: CapabilityCache::new(),
        }
    }

    #[cfg(test)]
    fn with_voices(binary: &str, voices: &[String]) -> Self {
        Self {
            binary: binary.to_string(),
            timeout: Duration::from_secs(5),
            capabilities: CapabilityCache::seeded(describe(voices)),
        }
    }

    fn list_voices(&self) -> Result<Vec<String>, SynthError> {
        let out = process::run(&self.binary, &["--voices".to_string()], None, self.timeout)?;
        Ok(parse_voices(&String::from_utf8_lossy(&out)))
    }
}

/// Parses the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
/// ```
/// Returns the sorted, distinct language ids.
pub fn parse_voices(output: &str) -> Vec<String> {
    let mut voices: Vec<String> = output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            (fields.len() >= 4).then(|| fields[1].to_string())
        })
        .collect();
    voices.sort();
    voices.dedup();
    voices
}

fn describe(voices: &[String]) -> Descriptor {
    let mut values = vec![DEFAULT_VOICE.to_string()];
    for variant in VARIANTS {
        values.extend(voices.iter().map(|v| format!("{}{}", v, variant)));
    }

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
            "pitch".to_string(),
            Capability::Range {
                minimum: 0.0,
                maximum: 1.0,
                default: 0.5,
            },
        ),
        (
            "voice".to_string(),
            Capability::Enumeration {
                values,
                default: DEFAULT_VOICE.to_string(),
            },
        ),
    ]);

    Descriptor {
        name: NAME.to_string(),
        capabilities,
    }
}

impl SynthesizerFactory for EspeakFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn probe(&self) -> Result<(), SynthError> {
        self.capabilities().map(|_| ())
    }

    fn capabilities(&self) -> Result<Arc<Descriptor>, SynthError> {
        self.capabilities
            .get_or_try_init(|| Ok(describe(&self.list_voices()?)))
    }

    fn construct(
        &self,
        cache_dir: &Path,
        properties: &Properties,
    ) -> Result<Box<dyn Synthesizer>, SynthError> {
        let rate = numeric_property(properties, "rate")?
            .map(|r| clamp_int(r, MIN_RATE, MAX_RATE))
            .unwrap_or(DEFAULT_RATE);
        let pitch = numeric_property(properties, "pitch")?
            .map(|p| clamp_int(p * 100.0, MIN_PITCH, MAX_PITCH))
            .unwrap_or(DEFAULT_PITCH);
        let voice = enumerated_property(properties, "voice", || self.capabilities())?
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());

        let options = vec![rate.to_string(), pitch.to_string(), voice.clone()];
        Ok(Box::new(EspeakSynth {
            binary: self.binary.clone(),
            timeout: self.timeout,
            cache_dir: cache_dir.to_path_buf(),
            param_hash: cache::param_hash(NAME, &options),
            rate,
            pitch,
            voice,
        }))
    }
}

pub struct EspeakSynth {
    binary: String,
    timeout: Duration,
    cache_dir: PathBuf,
    param_hash: String,
    rate: i64,
    pitch: i64,
    voice: String,
}

impl EspeakSynth {
    fn args(&self, out: &Path) -> Vec<String> {
        vec![
            format!("-s{}", self.rate),
            format!("-p{}", self.pitch),
            format!("-v{}", self.voice),
            "-w".to_string(),
            out.to_string_lossy().into_owned(),
            "--stdin".to_string(),
        ]
    }
}

impl Synthesizer for EspeakSynth {
    fn param_hash(&self) -> &str {
        &self.param_hash
    }

    fn render(&self, text: &str) -> Result<String, SynthError> {
        render_cached(&self.cache_dir, &self.param_hash, text, |out| {
            process::run(&self.binary, &self.args(out), Some(text), self.timeout).map(|_| ())
        })
    }
}
