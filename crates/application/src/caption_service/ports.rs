use async_trait::async_trait;
use moodcap_core::AppResult;
use moodcap_domain::ImageSource;

/// Port for the external caption generation backend.
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    /// Generates captions for an image. `prompt` and `mood` are normalised.
    async fn generate(
        &self,
        image: &ImageSource,
        prompt: &str,
        mood: &str,
    ) -> AppResult<Vec<String>>;
}
