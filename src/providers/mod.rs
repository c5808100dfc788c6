//! Text extraction provider implementations
//!
//! Each provider wraps a remote OCR-capable service behind the `TextExtractor`
//! trait. A provider is registered only when its credentials are configured.

pub mod openai;
pub mod vision;

use crate::config::Config;
use crate::error::AppError;
use crate::provider::TextExtractor;
use serde::Serialize;
use std::sync::Arc;

/// Every provider name the server understands, configured or not
pub const KNOWN_PROVIDERS: [&str; 2] = [vision::NAME, openai::NAME];

/// Information about an available provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Registry of configured text extraction providers
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn TextExtractor>>,
    default_provider: String,
}

impl ProviderRegistry {
    /// Create a registry with every provider that has credentials configured
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let mut providers: Vec<Arc<dyn TextExtractor>> = Vec::new();

        if let Some(vision_config) = &config.vision {
            tracing::info!("Registering Google Cloud Vision provider");
            providers.push(Arc::new(vision::VisionProvider::new(vision_config)?));
        }

        if let Some(openai_config) = &config.openai {
            tracing::info!(model = %openai_config.model, "Registering OpenAI vision provider");
            providers.push(Arc::new(openai::OpenAiProvider::new(openai_config)));
        }

        if providers.is_empty() {
            tracing::warn!(
                "No text extraction provider configured; only image enhancement is available"
            );
        }

        Ok(Self::from_providers(providers, &config.default_provider))
    }

    pub fn from_providers(providers: Vec<Arc<dyn TextExtractor>>, default_provider: &str) -> Self {
        Self {
            providers,
            default_provider: default_provider.to_string(),
        }
    }

    /// Get a provider by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn TextExtractor>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Look up a provider, telling apart unknown names from unconfigured ones
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn TextExtractor>, AppError> {
        if let Some(provider) = self.get(name) {
            return Ok(provider);
        }
        if KNOWN_PROVIDERS.contains(&name) {
            Err(AppError::NotConfigured(format!(
                "text extraction provider '{}' has no credentials",
                name
            )))
        } else {
            Err(AppError::UnknownProvider(name.to_string()))
        }
    }

    /// Get the default provider name
    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    /// List all available provider names
    pub fn list(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Get info about all available providers
    pub fn info(&self) -> Vec<ProviderInfo> {
        self.providers
            .iter()
            .map(|p| ProviderInfo {
                name: p.name(),
                description: p.description(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed;

    #[async_trait]
    impl TextExtractor for Fixed {
        fn name(&self) -> &'static str {
            "openai"
        }

        fn description(&self) -> &'static str {
            "fixed text"
        }

        async fn extract_text(&self, _image: &[u8]) -> Result<String, AppError> {
            Ok("texto".to_string())
        }
    }

    #[test]
    fn test_resolve_distinguishes_unknown_from_unconfigured() {
        let registry = ProviderRegistry::from_providers(vec![Arc::new(Fixed)], "vision");

        assert!(registry.resolve("openai").is_ok());
        assert!(matches!(
            registry.resolve("vision"),
            Err(AppError::NotConfigured(_))
        ));
        assert!(matches!(
            registry.resolve("textract"),
            Err(AppError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_registry_lists_configured_providers() {
        let registry = ProviderRegistry::from_providers(vec![Arc::new(Fixed)], "openai");
        assert_eq!(registry.list(), vec!["openai"]);
        assert_eq!(registry.default_name(), "openai");
        assert_eq!(registry.info()[0].description, "fixed text");
    }
}
