use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::debug;

use super::anthropic::Anthropic;
use super::deepl::DeepL;
use super::mock::MockBackend;
use super::noop::NoopBackend;
use super::ollama::Ollama;
use super::openai::OpenAI;
use super::{BackendSettings, TranslationBackend};

/// Backends available without registering anything
pub const BUILTIN_BACKENDS: &[&str] = &["noop", "ollama", "openai", "anthropic", "deepl", "mock"];

/// Constructor for a backend from resolved settings
pub type BackendFactory =
    Arc<dyn Fn(&BackendSettings) -> Result<Arc<dyn TranslationBackend>> + Send + Sync>;

/// Name to constructor table used to pick a backend at runtime
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

impl BackendRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in backend
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("noop", |settings| {
            Ok(Arc::new(NoopBackend::new(settings.capabilities)) as Arc<dyn TranslationBackend>)
        });
        registry.register("ollama", |settings| {
            Ok(Arc::new(Ollama::from_settings(settings)?) as Arc<dyn TranslationBackend>)
        });
        registry.register("openai", |settings| {
            Ok(Arc::new(OpenAI::from_settings(settings)?) as Arc<dyn TranslationBackend>)
        });
        registry.register("anthropic", |settings| {
            Ok(Arc::new(Anthropic::from_settings(settings)?) as Arc<dyn TranslationBackend>)
        });
        registry.register("deepl", |settings| {
            Ok(Arc::new(DeepL::from_settings(settings)?) as Arc<dyn TranslationBackend>)
        });
        registry.register("mock", |settings| {
            let caps = settings.capabilities;
            Ok(Arc::new(
                MockBackend::working().with_capabilities(caps.max_batch_size, caps.max_in_flight),
            ) as Arc<dyn TranslationBackend>)
        });
        registry
    }

    /// Register or replace a backend constructor
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&BackendSettings) -> Result<Arc<dyn TranslationBackend>> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.to_lowercase(), Arc::new(factory));
    }

    /// Whether a backend name is known
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the backend named in the settings
    pub fn create(&self, settings: &BackendSettings) -> Result<Arc<dyn TranslationBackend>> {
        let factory = self.factories.get(&settings.name.to_lowercase()).ok_or_else(|| {
            anyhow!(
                "Unknown translation backend '{}', available: {}",
                settings.name,
                self.names().join(", ")
            )
        })?;
        debug!("Creating backend '{}' (model '{}')", settings.name, settings.model);
        factory(settings)
    }
}
