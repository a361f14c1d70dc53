use crate::config;
use crate::error::GenerationError;
use crate::models::{GenerationOptions, ImageData, ProviderConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// What the controller hands to a provider for one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub options: GenerationOptions,
}

// Trait defining the interface for image generation services
#[async_trait]
pub trait ImageGenerationProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<ImageData, GenerationError>;
}

// --- OpenAI-style /images/generations Provider Implementation ---

#[derive(Serialize, Debug)]
struct ImagesRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    n: u32,
    response_format: &'a str,
}

#[derive(Deserialize, Debug)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImagesResponseItem>,
}

#[derive(Deserialize, Debug)]
struct ImagesResponseItem {
    b64_json: Option<String>,
    url: Option<String>,
}

pub struct OpenAiImagesProvider {
    client: Client,
    config: ProviderConfig,
    // Bypasses `api_key_ref` lookup when set
    api_key: Option<String>,
}

impl OpenAiImagesProvider {
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn resolve_api_key(&self) -> Result<String, GenerationError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        config::get_api_key(&self.config).map_err(|e| {
            log::error!("No API key for provider '{}': {:?}", self.config.name, e);
            GenerationError::NotConfigured(format!("{:#}", e))
        })
    }
}

const LOG_BODY_LIMIT: usize = 200;

// Response bodies can carry whole images; keep log lines short
fn body_preview(body: &str) -> String {
    if body.chars().count() <= LOG_BODY_LIMIT {
        return body.to_string();
    }
    let head: String = body.chars().take(LOG_BODY_LIMIT).collect();
    format!("{}... ({} bytes total)", head, body.len())
}

/// Extracts the first image from a successful response body.
pub fn parse_generation_response(body: &str) -> Result<ImageData, GenerationError> {
    let parsed: ImagesResponse = serde_json::from_str(body).map_err(|e| {
        log::warn!("Unparseable image response: {} - Body: {}", e, body_preview(body));
        GenerationError::InvalidResponse(format!("Malformed response body: {}", e))
    })?;

    let Some(first) = parsed.data.into_iter().next() else {
        return Err(GenerationError::InvalidResponse(
            "No image returned from API".to_string(),
        ));
    };

    match (first.b64_json, first.url) {
        (Some(b64), _) if !b64.is_empty() => {
            STANDARD.decode(&b64).map_err(|e| {
                GenerationError::InvalidResponse(format!("Image payload is not valid base64: {}", e))
            })?;
            Ok(ImageData::Inline(b64))
        }
        (_, Some(url)) if !url.is_empty() => Ok(ImageData::Url(url)),
        _ => Err(GenerationError::InvalidResponse(
            "No image returned from API".to_string(),
        )),
    }
}

#[async_trait]
impl ImageGenerationProvider for OpenAiImagesProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<ImageData, GenerationError> {
        let api_key = self.resolve_api_key()?;

        let request_body = ImagesRequestBody {
            model: &self.config.model,
            prompt: &request.prompt,
            width: request.options.width,
            height: request.options.height,
            steps: request.options.num_inference_steps,
            seed: request.options.seed,
            n: 1,
            response_format: "b64_json",
        };

        let request_url = format!(
            "{}/images/generations",
            self.config.api_url.trim_end_matches('/')
        );
        log::info!(
            "Sending image request to {} using model: {} ({}x{}, {} steps)",
            request_url,
            self.config.model,
            request_body.width,
            request_body.height,
            request_body.steps
        );

        let response = self
            .client
            .post(&request_url)
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                log::error!("Image request failed to send: {:?}", e);
                if e.is_timeout() {
                    GenerationError::ServiceUnavailable("Request timed out".to_string())
                } else {
                    GenerationError::ServiceUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::ServiceUnavailable(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let preview = body_preview(&body);
            log::error!("Image API request failed with status {}: {}", status, preview);
            return Err(GenerationError::ServiceUnavailable(format!(
                "API request failed with status {}: {}",
                status, preview
            )));
        }

        parse_generation_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_image() {
        let data = parse_generation_response(r#"{"data":[{"b64_json":"aGVsbG8="}]}"#);
        assert_eq!(data, Ok(ImageData::Inline("aGVsbG8=".to_string())));
    }

    #[test]
    fn falls_back_to_url() {
        let data = parse_generation_response(r#"{"data":[{"url":"https://img.example/1.png"}]}"#);
        assert_eq!(data, Ok(ImageData::Url("https://img.example/1.png".to_string())));
    }

    #[test]
    fn missing_image_field_is_invalid() {
        for body in [r#"{"data":[]}"#, r#"{"data":[{}]}"#, r#"{"id":"x"}"#] {
            match parse_generation_response(body) {
                Err(GenerationError::InvalidResponse(msg)) => {
                    assert_eq!(msg, "No image returned from API")
                }
                other => panic!("unexpected result for {}: {:?}", body, other),
            }
        }
    }

    #[test]
    fn malformed_body_is_invalid() {
        assert!(matches!(
            parse_generation_response("<html>oops</html>"),
            Err(GenerationError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_generation_response(r#"{"data":[{"b64_json":"***"}]}"#),
            Err(GenerationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn long_bodies_are_shortened_for_logs() {
        assert_eq!(body_preview(r#"{"error":"boom"}"#), r#"{"error":"boom"}"#);

        let huge = format!(r#"{{"data":[{{"b64_json":"{}"}}]}}"#, "A".repeat(2_000_000));
        let preview = body_preview(&huge);
        assert!(preview.len() < 300, "preview is {} bytes", preview.len());
        assert!(preview.starts_with(r#"{"data":[{"b64_json":"AAA"#));
        assert!(preview.ends_with(&format!("({} bytes total)", huge.len())));
    }

    #[tokio::test]
    async fn missing_credential_is_not_configured() -> anyhow::Result<()> {
        let provider = OpenAiImagesProvider::new(
            ProviderConfig {
                name: "test".to_string(),
                api_url: "http://127.0.0.1:9".to_string(),
                model: "m".to_string(),
                api_key_ref: None,
            },
            Duration::from_secs(1),
        )?;
        let request = GenerationRequest {
            prompt: "a cat".to_string(),
            options: GenerationOptions::default(),
        };
        assert!(matches!(
            provider.generate(&request).await,
            Err(GenerationError::NotConfigured(_))
        ));
        Ok(())
    }
}
