//! macOS `say` command.

use super::{
    clamp_int, enumerated_property, numeric_property, render_cached, Capability,
    CapabilityCache, Descriptor, Properties, Synthesizer, SynthesizerFactory,
};
use crate::cache;
use crate::error::SynthError;
use crate::process;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "say";

pub const MIN_RATE: i64 = 80;
pub const MAX_RATE: i64 = 390;
pub const DEFAULT_RATE: i64 = 200;
pub const DEFAULT_VOICE: &str = "default";

lazy_static! {
    // "Bad News            en_US    # The light you see ..."
    static ref VOICE_LINE: Regex =
        Regex::new(r"^(?P<name>\S.*?)\s{2,}[a-z]{2,3}[_-][A-Za-z0-9]+\s+#").unwrap();
}

pub struct SayFactory {
    binary: String,
    timeout: Duration,
    capabilities: CapabilityCache,
}

impl SayFactory {
    pub fn new(binary: String, timeout: Duration) -> Self {
        Self {
            binary,
            timeout,
            capabilities: CapabilityCache::new(),
        }
    }

    fn list_voices(&self) -> Result<Vec<String>, SynthError> {
        let args = vec!["-v".to_string(), "?".to_string()];
        let out = process::run(&self.binary, &args, None, self.timeout)?;
        Ok(parse_voices(&String::from_utf8_lossy(&out)))
    }
}

pub fn parse_voices(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| VOICE_LINE.captures(line))
        .map(|caps| caps["name"].to_string())
        .collect()
}

impl SynthesizerFactory for SayFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn probe(&self) -> Result<(), SynthError> {
        self.capabilities().map(|_| ())
    }

    fn capabilities(&self) -> Result<Arc<Descriptor>, SynthError> {
        self.capabilities.get_or_try_init(|| {
            let mut values = self.list_voices()?;
            values.push(DEFAULT_VOICE.to_string());
            Ok(Descriptor {
                name: NAME.to_string(),
                capabilities: BTreeMap::from([
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
                        Capability::Enumeration {
                            values,
                            default: DEFAULT_VOICE.to_string(),
                        },
                    ),
                ]),
            })
        })
    }

    fn construct(
        &self,
        cache_dir: &Path,
        properties: &Properties,
    ) -> Result<Box<dyn Synthesizer>, SynthError> {
        let rate = numeric_property(properties, "rate")?
            .map(|r| clamp_int(r, MIN_RATE, MAX_RATE))
            .unwrap_or(DEFAULT_RATE);
        let voice = enumerated_property(properties, "voice", || self.capabilities())?
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());

        let options = vec![rate.to_string(), voice.clone()];
        Ok(Box::new(SaySynth {
            binary: self.binary.clone(),
            timeout: self.timeout,
            cache_dir: cache_dir.to_path_buf(),
            param_hash: cache::param_hash(NAME, &options),
            rate,
            voice,
        }))
    }
}

pub struct SaySynth {
    binary: String,
    timeout: Duration,
    cache_dir: PathBuf,
    param_hash: String,
    rate: i64,
    voice: String,
}

impl SaySynth {
    fn args(&self, out: &Path) -> Vec<String> {
        let mut args = vec!["-r".to_string(), self.rate.to_string()];
        if self.voice != DEFAULT_VOICE {
            args.push("-v".to_string());
            args.push(self.voice.clone());
        }
        args.extend([
            "-o".to_string(),
            out.to_string_lossy().into_owned(),
            "--data-format=LEI16@22050".to_string(),
            "-f".to_string(),
            "-".to_string(),
        ]);
        args
    }
}

impl Synthesizer for SaySynth {
    fn param_hash(&self) -> &str {
        &self.param_hash
    }

    fn render(&self, text: &str) -> Result<String, SynthError> {
        render_cached(&self.cache_dir, &self.param_hash, text, |out| {
            process::run(&self.binary, &self.args(out), Some(text), self.timeout).map(|_| ())
        })
    }
}
