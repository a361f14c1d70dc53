use serde::Serialize;

/// Failure of a single generation attempt, or a refusal to start one.
///
/// Every variant is local to one attempt: none of them touch the gallery,
/// and the controller keeps accepting input afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "message")]
pub enum GenerationError {
    #[error("Image service not configured: {0}")]
    NotConfigured(String),

    #[error("A generation request is already in flight")]
    AlreadyInFlight,

    #[error("Prompt is required")]
    EmptyPrompt,

    #[error("Image service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response from image service: {0}")]
    InvalidResponse(String),

    #[error("Not signed in")]
    Unauthenticated,
}

impl GenerationError {
    /// Whether the user can recover by editing the prompt or forcing a retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GenerationError::ServiceUnavailable(_) | GenerationError::InvalidResponse(_)
        )
    }
}
