mod moderation;
mod openai;
mod pipeline;

pub use moderation::{normalize_rewrite, ModerationProfile};
pub use openai::OpenAiAgent;
pub use pipeline::{GeneratedImage, ImageSettings, Pipeline, PipelineError};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Could not decode response: {0}")]
    Decode(String),

    #[error("Response contained no {0}")]
    Empty(&'static str),
}

/// What an image provider hands back: the encoded image itself, or a URL
/// where the provider already hosts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageResult {
    Bytes(Vec<u8>),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub quality: Option<String>,
}

/// Prompt-completion service that turns a learner's running description
/// into one image prompt.
#[async_trait]
pub trait PromptRewriter: Send + Sync {
    async fn rewrite(
        &self,
        history: &[String],
        profile: &ModerationProfile,
    ) -> Result<String, AgentError>;
}

#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &ImageRequest) -> Result<ImageResult, AgentError>;
}
