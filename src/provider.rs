use crate::error::AppError;
use async_trait::async_trait;

/// Trait that all text extraction providers must implement
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Returns the provider identifier (e.g., "vision", "openai")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the provider
    fn description(&self) -> &'static str;

    /// Extract handwritten text from an encoded image.
    ///
    /// An image without recognizable text is not an error: providers return
    /// their placeholder message instead.
    async fn extract_text(&self, image: &[u8]) -> Result<String, AppError>;
}
