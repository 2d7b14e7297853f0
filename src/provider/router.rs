//! Provider Router
//!
//! Maps model identifiers to provider implementations through a static
//! registry built from configuration. Routing is capability-polymorphic:
//! one adapter per provider behind the shared [`ModelProvider`] contract,
//! selected by lookup, never by runtime type inspection.
//!
//! The router performs no retries - that is a caller concern - but it
//! does fail fast: an unregistered model yields `UnknownModel`
//! synchronously, before any network call.

use std::collections::HashMap;
use tracing::debug;

use super::{ModelProvider, SharedProvider, create_provider};
use crate::config::Config;
use crate::types::{ForgeError, Result};

/// Static model -> provider dispatch table.
pub struct ProviderRouter {
    /// model identifier -> provider
    routes: HashMap<String, SharedProvider>,
}

impl ProviderRouter {
    /// Build the registry from configuration.
    ///
    /// Providers that fail to construct (e.g. missing API key) are
    /// skipped with their models unregistered; requests for those models
    /// then fail with `UnknownModel` instead of at dispatch time.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers: HashMap<String, SharedProvider> = HashMap::new();
        for (name, provider_config) in &config.providers {
            match create_provider(name, provider_config, &config.generation) {
                Ok(provider) => {
                    providers.insert(name.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "Provider unavailable, skipping");
                }
            }
        }

        let mut routes = HashMap::new();
        for (model, provider_name) in &config.models {
            if let Some(provider) = providers.get(provider_name) {
                debug!(model = %model, provider = %provider_name, "Registered model route");
                routes.insert(model.clone(), provider.clone());
            }
        }

        Ok(Self { routes })
    }

    /// Build a router from explicit routes (tests, embedding callers)
    pub fn from_routes(routes: Vec<(String, SharedProvider)>) -> Self {
        Self {
            routes: routes.into_iter().collect(),
        }
    }

    /// Resolve the provider for a model identifier.
    ///
    /// Signals `UnknownModel` synchronously when the model has no
    /// registered provider.
    pub fn route(&self, model: &str) -> Result<SharedProvider> {
        self.routes
            .get(model)
            .cloned()
            .ok_or_else(|| ForgeError::UnknownModel {
                model: model.to_string(),
            })
    }

    /// Registered model identifiers, sorted
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }

    /// Check reachability of every registered provider, by provider name
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        let mut seen: HashMap<&str, &SharedProvider> = HashMap::new();
        for provider in self.routes.values() {
            seen.entry(provider.name()).or_insert(provider);
        }

        let mut results = Vec::new();
        for (name, provider) in seen {
            let healthy = provider.health_check().await.unwrap_or(false);
            results.push((name.to_string(), healthy));
        }
        results.sort();
        results
    }
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("models", &self.models())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{RawChunk, RawStream};
    use crate::types::GenerationRequest;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubProvider(&'static str);

    #[async_trait]
    impl ModelProvider for StubProvider {
        async fn open(&self, _request: &GenerationRequest) -> Result<RawStream> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(RawChunk::done())])))
        }

        fn name(&self) -> &str {
            self.0
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn router() -> ProviderRouter {
        ProviderRouter::from_routes(vec![
            ("gpt-4o".to_string(), Arc::new(StubProvider("openai")) as _),
            ("llama3".to_string(), Arc::new(StubProvider("ollama")) as _),
        ])
    }

    #[test]
    fn test_route_known_model() {
        let provider = router().route("gpt-4o").unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_route_unknown_model_fails_synchronously() {
        match router().route("made-up-model-x") {
            Ok(provider) => panic!("expected UnknownModel, resolved {}", provider.name()),
            Err(ForgeError::UnknownModel { model }) => assert_eq!(model, "made-up-model-x"),
            Err(other) => panic!("expected UnknownModel, got {other:?}"),
        }
    }

    #[test]
    fn test_models_sorted() {
        assert_eq!(router().models(), vec!["gpt-4o", "llama3"]);
    }
}
