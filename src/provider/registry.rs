//! Owned provider registry.
//!
//! Maps provider *types* to factories and caches built instances by name.
//! The `openai` factory is registered at construction; callers can add
//! factories for custom adapters. No process-wide instance exists.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{ConfigError, GenerationConfig};
use crate::provider::{OpenAiProvider, Provider};

/// Builds a provider instance from the run configuration.
pub type ProviderFactory =
    Box<dyn Fn(&GenerationConfig) -> Result<Arc<dyn Provider>, ConfigError> + Send + Sync>;

/// Registry of provider factories and instances.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    instances: HashMap<String, Arc<dyn Provider>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Create a registry with the built-in `openai` factory.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            instances: HashMap::new(),
        };
        registry.register_factory("openai", Box::new(build_openai));
        registry
    }

    /// Register a factory for a provider type.
    pub fn register_factory(&mut self, provider_type: impl Into<String>, factory: ProviderFactory) {
        self.factories.insert(provider_type.into(), factory);
    }

    /// Register an already-built provider instance under a name.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.instances.insert(name.into(), provider);
    }

    /// Fetch the provider named in the configuration, building it on first
    /// use from the factory for its configured type.
    pub fn get_or_create(
        &mut self,
        config: &GenerationConfig,
    ) -> Result<Arc<dyn Provider>, ConfigError> {
        if let Some(provider) = self.instances.get(&config.provider) {
            return Ok(Arc::clone(provider));
        }

        let settings = config.provider_settings();
        let factory = self
            .factories
            .get(&settings.kind)
            .ok_or_else(|| ConfigError::UnknownProviderType(settings.kind.clone()))?;

        let provider = factory(config)?;
        self.instances
            .insert(config.provider.clone(), Arc::clone(&provider));
        Ok(provider)
    }

    /// Names of all registered provider types, sorted.
    pub fn list_types(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn build_openai(config: &GenerationConfig) -> Result<Arc<dyn Provider>, ConfigError> {
    let settings = config.provider_settings();
    let api_key = settings.resolve_api_key(&config.provider)?;

    let provider = OpenAiProvider::new(
        config.provider.clone(),
        config.model.clone(),
        api_key,
        settings.base_url.clone(),
        settings.timeout_secs,
        settings.headers.clone(),
    )
    .map_err(|e| ConfigError::Invalid(format!("building openai provider: {e}")))?;

    Ok(Arc::new(provider))
}
