use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // HTTP front end
    pub host: String,
    pub port: u16,
    // Where rendered and encoded artifacts live
    pub cache_dir: PathBuf,
    // Where the cache-warming metrics database lives
    pub data_dir: PathBuf,
    // Worker pool
    pub workers: usize,
    pub job_timeout_secs: u64,
    pub engine_timeout_secs: u64,
    // Engines: a required engine that fails its probe aborts startup
    pub required_engines: Vec<String>,
    pub optional_engines: Vec<String>,
    pub espeak_binary: String,
    pub piper_binary: String,
    pub piper_models_dir: PathBuf,
    pub piper_default_voice: String,
    pub say_binary: String,
    // Encoders
    pub oggenc_binary: String,
    pub lame_binary: String,
}

impl Default for Settings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| home.join(".cache"))
                .join("speechd-cache/files"),
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| home.join(".local/share"))
                .join("speechd-cache"),
            workers: 4,
            job_timeout_secs: 120,
            engine_timeout_secs: 30,
            required_engines: vec!["espeak".to_string()],
            optional_engines: vec!["piper".to_string(), "say".to_string()],
            espeak_binary: "espeak-ng".to_string(),
            piper_binary: "piper".to_string(),
            piper_models_dir: home.join(".local/share/piper/models"),
            piper_default_voice: "en_US-lessac-medium".to_string(),
            say_binary: "say".to_string(),
            oggenc_binary: "oggenc".to_string(),
            lame_binary: "lame".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then `Speech.*` in the working directory, then the user config
    /// file (or `file` when given), then `SPEECHD_CACHE_*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("Speech").required(false));

        builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(
                File::with_name(&format!(
                    "{}/.config/speechd-cache/Speech",
                    std::env::var("HOME").unwrap_or_default()
                ))
                .required(false),
            ),
        };

        let builder = builder.add_source(
            config::Environment::with_prefix("SPEECHD_CACHE")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("required_engines")
                .with_list_parse_key("optional_engines"),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.workers == 0 {
            return Err(config::ConfigError::Message(
                "workers must be greater than 0".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(config::ConfigError::Message(
                "port must be greater than 0".to_string(),
            ));
        }
        if self.job_timeout_secs == 0 || self.engine_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
