use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use super::{AgentError, ImageRequest, ImageResult, ImageSynthesizer, ModerationProfile, PromptRewriter};
use crate::config::ApiKeyPool;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: Option<String>,
}

/// OpenAI-compatible client covering both the chat rewrite and the image
/// generation calls. Each request draws a key from the pool.
pub struct OpenAiAgent {
    client: Client,
    keys: ApiKeyPool,
    base_url: String,
    rewrite_model: String,
}

impl OpenAiAgent {
    pub fn new(keys: ApiKeyPool, base_url: &str, rewrite_model: String) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            keys,
            base_url: base_url.trim_end_matches('/').to_string(),
            rewrite_model,
        })
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<String, AgentError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(self.keys.pick())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(text);
        }

        let message = parse_openai_error(&text).unwrap_or_else(|| text.trim().to_string());
        warn!("OpenAI {} returned {}: {}", path, status, message);
        Err(AgentError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PromptRewriter for OpenAiAgent {
    async fn rewrite(
        &self,
        history: &[String],
        profile: &ModerationProfile,
    ) -> Result<String, AgentError> {
        info!(
            "Rewriting description with model {} ({} entries)",
            self.rewrite_model,
            history.len()
        );

        let body = ChatRequest {
            model: self.rewrite_model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: profile.system_instruction.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: profile.rewrite_instruction(history),
                },
            ],
        };

        let text = self.post_json("chat/completions", &body).await?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| AgentError::Decode(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or(AgentError::Empty("completion text"))
    }
}

#[async_trait]
impl ImageSynthesizer for OpenAiAgent {
    async fn synthesize(&self, request: &ImageRequest) -> Result<ImageResult, AgentError> {
        info!("Generating {} image with model {}", request.size, request.model);

        let body = ImagesRequest {
            model: &request.model,
            prompt: &request.prompt,
            size: &request.size,
            n: 1,
            quality: request.quality.as_deref(),
        };

        let text = self.post_json("images/generations", &body).await?;
        let parsed: ImagesResponse =
            serde_json::from_str(&text).map_err(|e| AgentError::Decode(e.to_string()))?;
        let image = parsed
            .data
            .into_iter()
            .next()
            .ok_or(AgentError::Empty("image"))?;

        decode_image(image)
    }
}

fn decode_image(image: ImageData) -> Result<ImageResult, AgentError> {
    if let Some(encoded) = image.b64_json {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AgentError::Decode(e.to_string()))?;
        return Ok(ImageResult::Bytes(bytes));
    }
    image
        .url
        .map(ImageResult::Url)
        .ok_or(AgentError::Empty("image payload"))
}

fn parse_openai_error(body: &str) -> Option<String> {
    serde_json::from_str::<OpenAiErrorEnvelope>(body)
        .ok()?
        .error?
        .message
        .filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_prefers_inline_bytes() {
        let image = ImageData {
            b64_json: Some("aGVsbG8=".to_string()),
            url: Some("https://example.com/x.png".to_string()),
        };
        assert_eq!(decode_image(image).unwrap(), ImageResult::Bytes(b"hello".to_vec()));
    }

    #[test]
    fn test_decode_falls_back_to_url() {
        let image = ImageData {
            b64_json: None,
            url: Some("https://example.com/x.png".to_string()),
        };
        assert_eq!(
            decode_image(image).unwrap(),
            ImageResult::Url("https://example.com/x.png".to_string())
        );
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        let image = ImageData {
            b64_json: None,
            url: None,
        };
        assert!(matches!(decode_image(image), Err(AgentError::Empty(_))));
    }

    #[test]
    fn test_parse_openai_error_message() {
        let body = r#"{"error":{"message":"Your request was rejected by the safety system."}}"#;
        assert_eq!(
            parse_openai_error(body).as_deref(),
            Some("Your request was rejected by the safety system.")
        );
        assert_eq!(parse_openai_error("not json"), None);
    }

    #[test]
    fn test_images_request_omits_missing_quality() {
        let body = ImagesRequest {
            model: "gpt-image-1",
            prompt: "A flat 2D illustration of a fox",
            size: "1024x1024",
            n: 1,
            quality: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["n"], 1);
        assert!(json.get("quality").is_none());
    }
}
