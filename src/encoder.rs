//! Delivery-format encoders. Each takes the raw `<identity>.wav` an engine
//! rendered and produces `<identity>.<ext>` beside it, skipping the work when
//! that file already exists.

use crate::cache;
use crate::config_loader::Settings;
use crate::error::SynthError;
use crate::process;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub trait Encoder: Send {
    fn encode(&self, identity: &str) -> Result<(), SynthError>;
}

pub trait EncoderFactory: Send + Sync {
    /// Format name with its leading dot, e.g. `.ogg`.
    fn format(&self) -> &str;

    fn construct(&self, cache_dir: &Path) -> Result<Box<dyn Encoder>, SynthError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Wav,
    Ogg,
    Mp3,
}

impl EncoderKind {
    pub const ALL: [EncoderKind; 3] = [EncoderKind::Wav, EncoderKind::Ogg, EncoderKind::Mp3];

    pub fn format(self) -> &'static str {
        match self {
            EncoderKind::Wav => ".wav",
            EncoderKind::Ogg => ".ogg",
            EncoderKind::Mp3 => ".mp3",
        }
    }
}

/// Accepts `ogg` as well as `.ogg`.
pub fn normalize_format(format: &str) -> String {
    let format = format.trim().to_ascii_lowercase();
    if format.starts_with('.') {
        format
    } else {
        format!(".{}", format)
    }
}

pub struct KindFactory {
    kind: EncoderKind,
    binary: String,
    timeout: Duration,
}

impl KindFactory {
    pub fn new(kind: EncoderKind, settings: &Settings) -> Self {
        let binary = match kind {
            EncoderKind::Wav => String::new(),
            EncoderKind::Ogg => settings.oggenc_binary.clone(),
            EncoderKind::Mp3 => settings.lame_binary.clone(),
        };
        Self {
            kind,
            binary,
            timeout: Duration::from_secs(settings.engine_timeout_secs),
        }
    }
}

impl EncoderFactory for KindFactory {
    fn format(&self) -> &str {
        self.kind.format()
    }

    fn construct(&self, cache_dir: &Path) -> Result<Box<dyn Encoder>, SynthError> {
        Ok(Box::new(CommandEncoder {
            kind: self.kind,
            binary: self.binary.clone(),
            timeout: self.timeout,
            cache_dir: cache_dir.to_path_buf(),
        }))
    }
}

pub struct CommandEncoder {
    kind: EncoderKind,
    binary: String,
    timeout: Duration,
    cache_dir: PathBuf,
}

impl CommandEncoder {
    fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy().into_owned();
        let output = output.to_string_lossy().into_owned();
        match self.kind {
            EncoderKind::Wav => Vec::new(),
            EncoderKind::Ogg => vec!["-Q".to_string(), "-o".to_string(), output, input],
            EncoderKind::Mp3 => vec!["--quiet".to_string(), input, output],
        }
    }
}

impl Encoder for CommandEncoder {
    fn encode(&self, identity: &str) -> Result<(), SynthError> {
        let source = cache::artifact_path(&self.cache_dir, identity, cache::RAW_EXTENSION);
        if !source.is_file() {
            return Err(SynthError::Encoding(format!(
                "raw audio for {} is missing",
                identity
            )));
        }

        // The raw render already is the wav deliverable.
        if self.kind == EncoderKind::Wav {
            return Ok(());
        }

        let target = cache::artifact_path(&self.cache_dir, identity, self.kind.format());
        if target.is_file() {
            debug!(%identity, format = self.kind.format(), "encoded file cached");
            return Ok(());
        }

        cache::publish(&self.cache_dir, &target, |out| {
            process::run(&self.binary, &self.args(&source, out), None, self.timeout)
                .map(|_| ())
                .map_err(|e| SynthError::Encoding(e.to_string()))
        })
    }
}

/// Format name → encoder factory.
#[derive(Default, Clone)]
pub struct EncoderRegistry {
    factories: BTreeMap<String, Arc<dyn EncoderFactory>>,
}

impl EncoderRegistry {
    pub fn from_settings(settings: &Settings) -> Self {
        EncoderKind::ALL
            .into_iter()
            .fold(Self::default(), |registry, kind| {
                registry.with_factory(Arc::new(KindFactory::new(kind, settings)))
            })
    }

    pub fn with_factory(mut self, factory: Arc<dyn EncoderFactory>) -> Self {
        self.factories
            .insert(normalize_format(factory.format()), factory);
        self
    }

    pub fn formats(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn lookup(&self, format: &str) -> Option<Arc<dyn EncoderFactory>> {
        self.factories.get(&normalize_format(format)).cloned()
    }
}
