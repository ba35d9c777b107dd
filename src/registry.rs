//! The set of synthesis engines this process can use.

use crate::backends::{EngineKind, SynthesizerFactory};
use crate::config_loader::Settings;
use crate::error::StartupError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Name → factory table, fixed once built.
#[derive(Default, Clone)]
pub struct Registry {
    factories: BTreeMap<String, Arc<dyn SynthesizerFactory>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Probes every configured engine. A required engine that is unknown or
    /// fails its probe is fatal; an optional one is logged and left out.
    pub fn from_settings(settings: &Settings) -> Result<Self, StartupError> {
        let entries = configured(settings).map(|(name, required)| {
            let factory = EngineKind::from_name(&name).map(|kind| kind.factory(settings));
            (name, factory, required)
        });
        Self::probe_all(entries)
    }

    /// Same table as [`Registry::from_settings`] without probing. Worker
    /// processes use this: the coordinator has already probed and validated.
    pub fn unprobed(settings: &Settings) -> Self {
        let mut registry = Self::empty();
        for (name, _) in configured(settings) {
            if let Some(kind) = EngineKind::from_name(&name) {
                registry = registry.with_factory(kind.factory(settings));
            }
        }
        registry
    }

    pub fn probe_all<I>(entries: I) -> Result<Self, StartupError>
    where
        I: IntoIterator<Item = (String, Option<Arc<dyn SynthesizerFactory>>, bool)>,
    {
        let mut registry = Self::empty();

        for (name, factory, required) in entries {
            if registry.factories.contains_key(&name) {
                continue;
            }

            let outcome = match factory {
                None => Err("no such engine".to_string()),
                Some(factory) => factory.probe().map(|_| factory).map_err(|e| e.to_string()),
            };

            match outcome {
                Ok(factory) => {
                    info!(engine = %name, "speech engine available");
                    registry.factories.insert(name, factory);
                }
                Err(reason) if required => {
                    return Err(StartupError::RequiredEngineUnavailable { name, reason });
                }
                Err(reason) => {
                    warn!(engine = %name, %reason, "optional speech engine unavailable");
                }
            }
        }

        Ok(registry)
    }

    /// Adds `factory` under its own name without probing it.
    pub fn with_factory(mut self, factory: Arc<dyn SynthesizerFactory>) -> Self {
        self.factories.insert(factory.name().to_string(), factory);
        self
    }

    pub fn list_available(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn SynthesizerFactory>> {
        self.factories.get(name).cloned()
    }
}

fn configured(settings: &Settings) -> impl Iterator<Item = (String, bool)> + '_ {
    settings
        .required_engines
        .iter()
        .map(|name| (name.clone(), true))
        .chain(
            settings
                .optional_engines
                .iter()
                .map(|name| (name.clone(), false)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Descriptor, Properties, Synthesizer};
    use crate::error::SynthError;
    use std::path::Path;

    struct StubFactory {
        name: &'static str,
        healthy: bool,
    }

    impl SynthesizerFactory for StubFactory {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self) -> Result<(), SynthError> {
            if self.healthy {
                Ok(())
            } else {
                Err(SynthError::Synthesis(format!("{} is not installed", self.name)))
            }
        }

        fn capabilities(&self) -> Result<Arc<Descriptor>, SynthError> {
            Ok(Arc::new(Descriptor {
                name: self.name.to_string(),
                capabilities: BTreeMap::new(),
            }))
        }

        fn construct(
            &self,
            _cache_dir: &Path,
            _properties: &Properties,
        ) -> Result<Box<dyn Synthesizer>, SynthError> {
            Err(SynthError::Synthesis("stub".to_string()))
        }
    }

    fn stub(name: &'static str, healthy: bool) -> Option<Arc<dyn SynthesizerFactory>> {
        Some(Arc::new(StubFactory { name, healthy }))
    }

    #[test]
    fn test_optional_failures_are_omitted() {
        let registry = Registry::probe_all(vec![
            ("espeak".to_string(), stub("espeak", true), true),
            ("say".to_string(), stub("say", false), false),
            ("festival".to_string(), None, false),
        ])
        .unwrap();

        assert_eq!(registry.list_available(), vec!["espeak".to_string()]);
        assert!(registry.lookup("espeak").is_some());
        assert!(registry.lookup("say").is_none());
        assert!(registry.lookup("festival").is_none());
    }

    #[test]
    fn test_required_failure_is_fatal() {
        let err = Registry::probe_all(vec![("espeak".to_string(), stub("espeak", false), true)])
            .err()
            .expect("startup should fail");
        match err {
            StartupError::RequiredEngineUnavailable { name, reason } => {
                assert_eq!(name, "espeak");
                assert!(reason.contains("not installed"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unknown_required_engine_is_fatal() {
        assert!(Registry::probe_all(vec![("festival".to_string(), None, true)]).is_err());
    }

    #[test]
    fn test_unprobed_registry_uses_configured_names() {
        let settings = Settings {
            required_engines: vec!["espeak".to_string()],
            optional_engines: vec!["say".to_string(), "festival".to_string()],
            ..Settings::default()
        };
        let registry = Registry::unprobed(&settings);
        assert_eq!(
            registry.list_available(),
            vec!["espeak".to_string(), "say".to_string()]
        );
    }
}
