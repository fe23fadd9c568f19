use std::sync::Arc;
use tracing::{error, info};

use super::{
    normalize_rewrite, AgentError, ImageRequest, ImageResult, ImageSynthesizer, ModerationProfile,
    PromptRewriter,
};
use crate::storage::{ImageUploader, UploadError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Prompt rewrite failed: {0}")]
    Rewrite(#[source] AgentError),

    #[error("Prompt rewrite returned no text")]
    EmptyRewrite,

    #[error("Image generation failed: {0}")]
    Synthesis(#[source] AgentError),

    #[error("Image upload failed: {0}")]
    Upload(#[from] UploadError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSettings {
    pub model: String,
    pub size: String,
    pub quality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub prompt: String,
    pub image_url: String,
}

/// Description → rewritten prompt → image → public URL.
///
/// Each call either returns a finished image URL or fails as a whole; it
/// never touches the record store.
pub struct Pipeline {
    rewriter: Arc<dyn PromptRewriter>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    uploader: Arc<dyn ImageUploader>,
    initial: ImageSettings,
    regeneration: ImageSettings,
}

impl Pipeline {
    pub fn new(
        rewriter: Arc<dyn PromptRewriter>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        uploader: Arc<dyn ImageUploader>,
        initial: ImageSettings,
        regeneration: ImageSettings,
    ) -> Self {
        Self {
            rewriter,
            synthesizer,
            uploader,
            initial,
            regeneration,
        }
    }

    pub async fn generate(
        &self,
        history: &[String],
        profile: &ModerationProfile,
    ) -> Result<GeneratedImage, PipelineError> {
        let raw = self.rewriter.rewrite(history, profile).await.map_err(|e| {
            error!("Prompt rewrite failed: {}", e);
            PipelineError::Rewrite(e)
        })?;
        let prompt = normalize_rewrite(&raw).ok_or(PipelineError::EmptyRewrite)?;
        info!("Rewritten prompt: {}", prompt);

        self.render(prompt, &self.initial).await
    }

    /// Re-renders a stored description without the rewrite step, framed by
    /// the profile's regeneration template.
    pub async fn regenerate(
        &self,
        description: &str,
        profile: &ModerationProfile,
    ) -> Result<GeneratedImage, PipelineError> {
        let prompt = profile.regeneration_prompt(description);
        self.render(prompt, &self.regeneration).await
    }

    async fn render(
        &self,
        prompt: String,
        settings: &ImageSettings,
    ) -> Result<GeneratedImage, PipelineError> {
        let request = ImageRequest {
            model: settings.model.clone(),
            prompt,
            size: settings.size.clone(),
            quality: settings.quality.clone(),
        };
        let image = self.synthesizer.synthesize(&request).await.map_err(|e| {
            error!("Image generation failed: {}", e);
            PipelineError::Synthesis(e)
        })?;
        let image_url = self.publish(image).await?;

        Ok(GeneratedImage {
            prompt: request.prompt,
            image_url,
        })
    }

    /// Provider-hosted images are already public and pass through as-is.
    async fn publish(&self, image: ImageResult) -> Result<String, PipelineError> {
        match image {
            ImageResult::Bytes(bytes) => Ok(self.uploader.upload(bytes, None).await?),
            ImageResult::Url(url) => Ok(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRewriter, FakeSynthesizer, FakeUploader};

    fn pipeline(
        rewriter: Arc<FakeRewriter>,
        synthesizer: Arc<FakeSynthesizer>,
        uploader: Arc<FakeUploader>,
    ) -> Pipeline {
        crate::testing::pipeline_with(rewriter, synthesizer, uploader)
    }

    #[tokio::test]
    async fn test_generate_runs_rewrite_synthesis_and_upload() {
        let rewriter = Arc::new(FakeRewriter::new());
        let synthesizer = Arc::new(FakeSynthesizer::bytes());
        let uploader = Arc::new(FakeUploader::new());
        let pipeline = pipeline(rewriter.clone(), synthesizer.clone(), uploader.clone());
        let history = vec!["a dog".to_string()];

        let image = pipeline
            .generate(&history, &ModerationProfile::elementary())
            .await
            .unwrap();

        assert_eq!(image.prompt, "A flat 2D illustration of a dog");
        assert_eq!(image.image_url, "https://storage.test/images/1.png");
        assert_eq!(rewriter.calls(), vec![history]);
        let requests = synthesizer.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].size, "1024x1024");
        assert_eq!(requests[0].prompt, image.prompt);
    }

    #[tokio::test]
    async fn test_rewrite_failure_skips_synthesis_and_upload() {
        let rewriter = Arc::new(FakeRewriter::failing());
        let synthesizer = Arc::new(FakeSynthesizer::bytes());
        let uploader = Arc::new(FakeUploader::new());
        let pipeline = pipeline(rewriter, synthesizer.clone(), uploader.clone());

        let err = pipeline
            .generate(&["a dog".to_string()], &ModerationProfile::elementary())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Rewrite(_)));
        assert!(synthesizer.requests().is_empty());
        assert_eq!(uploader.uploads(), 0);
    }

    #[tokio::test]
    async fn test_blank_rewrite_is_an_error() {
        let rewriter = Arc::new(FakeRewriter::returning("   "));
        let synthesizer = Arc::new(FakeSynthesizer::bytes());
        let pipeline = pipeline(rewriter, synthesizer.clone(), Arc::new(FakeUploader::new()));

        let err = pipeline
            .generate(&["a dog".to_string()], &ModerationProfile::elementary())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EmptyRewrite));
        assert!(synthesizer.requests().is_empty());
    }

    #[tokio::test]
    async fn test_hosted_url_skips_upload() {
        let uploader = Arc::new(FakeUploader::new());
        let pipeline = pipeline(
            Arc::new(FakeRewriter::new()),
            Arc::new(FakeSynthesizer::hosted("https://provider.test/img.png")),
            uploader.clone(),
        );

        let image = pipeline
            .generate(&["a dog".to_string()], &ModerationProfile::elementary())
            .await
            .unwrap();

        assert_eq!(image.image_url, "https://provider.test/img.png");
        assert_eq!(uploader.uploads(), 0);
    }

    #[tokio::test]
    async fn test_regenerate_uses_template_not_rewrite() {
        let rewriter = Arc::new(FakeRewriter::new());
        let synthesizer = Arc::new(FakeSynthesizer::bytes());
        let pipeline = pipeline(rewriter.clone(), synthesizer.clone(), Arc::new(FakeUploader::new()));

        let image = pipeline
            .regenerate("a happy dog in a park", &ModerationProfile::elementary())
            .await
            .unwrap();

        assert!(rewriter.calls().is_empty());
        assert!(image.prompt.starts_with("A flat 2D illustration of the following scene"));
        assert!(image.prompt.ends_with("a happy dog in a park"));
        assert_eq!(synthesizer.requests()[0].quality.as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn test_upload_failure_aborts() {
        let pipeline = pipeline(
            Arc::new(FakeRewriter::new()),
            Arc::new(FakeSynthesizer::bytes()),
            Arc::new(FakeUploader::failing()),
        );

        let err = pipeline
            .generate(&["a dog".to_string()], &ModerationProfile::elementary())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Upload(_)));
    }
}
