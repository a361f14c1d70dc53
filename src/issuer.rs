use crate::api::{GenerationRequest, ImageGenerationProvider};
use crate::error::GenerationError;
use crate::models::{GeneratedImage, GenerationOptions, ImageData};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct InFlight {
    prompt: String,
    call: BoxFuture<'static, Result<ImageData, GenerationError>>,
}

/// Single-flight issuer for image generation requests.
///
/// `issue` only starts the call; `next_outcome` drives it to completion. The
/// split lets the owning task keep handling input while the call is pending.
pub struct GenerationIssuer {
    provider: Arc<dyn ImageGenerationProvider>,
    timeout: Duration,
    last_issued_prompt: Option<String>,
    in_flight: Option<InFlight>,
}

impl GenerationIssuer {
    pub fn new(provider: Arc<dyn ImageGenerationProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            last_issued_prompt: None,
            in_flight: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_issued_prompt(&self) -> Option<&str> {
        self.last_issued_prompt.as_deref()
    }

    /// Starts a request for `prompt` with a snapshot of `options`.
    ///
    /// `last_issued_prompt` is updated here, before the service answers.
    pub fn issue(&mut self, prompt: &str, options: GenerationOptions) -> Result<(), GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        if self.in_flight.is_some() {
            log::debug!("Rejecting request for '{}': another request is in flight", prompt);
            return Err(GenerationError::AlreadyInFlight);
        }

        log::info!("Issuing generation request for prompt: '{}'", prompt);
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            options,
        };
        let provider = self.provider.clone();
        let timeout = self.timeout;
        let call = async move {
            match tokio::time::timeout(timeout, provider.generate(&request)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::ServiceUnavailable(format!(
                    "Request timed out after {}s",
                    timeout.as_secs()
                ))),
            }
        }
        .boxed();

        self.last_issued_prompt = Some(prompt.to_string());
        self.in_flight = Some(InFlight {
            prompt: prompt.to_string(),
            call,
        });
        Ok(())
    }

    /// Waits for the in-flight request and clears the in-flight flag.
    ///
    /// Never resolves when nothing is in flight. Cancel-safe: dropping this
    /// future leaves the request in place for the next call.
    pub async fn next_outcome(&mut self) -> Result<GeneratedImage, GenerationError> {
        let result = match self.in_flight.as_mut() {
            Some(in_flight) => (&mut in_flight.call).await,
            None => std::future::pending().await,
        };
        // Only reachable when a call was in flight
        let prompt = self
            .in_flight
            .take()
            .map(|in_flight| in_flight.prompt)
            .unwrap_or_default();

        match result {
            Ok(image_data) => {
                let image = GeneratedImage {
                    id: Uuid::new_v4(),
                    prompt,
                    image_data,
                    created_at: Utc::now(),
                };
                log::info!("Generation succeeded for '{}' (image {})", image.prompt, image.id);
                Ok(image)
            }
            Err(e) => {
                log::error!("Generation failed for '{}': {}", prompt, e);
                Err(e)
            }
        }
    }
}
