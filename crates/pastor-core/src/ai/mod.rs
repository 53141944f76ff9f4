//! Generation service abstraction
//!
//! The orchestrator only ever needs "prompt in, text out", so every backend
//! sits behind [`GenerationService`].

pub mod failure;
pub mod gemini;

pub use failure::{FailureKind, RequestFailure};
pub use gemini::GeminiClient;

use async_trait::async_trait;

/// One stateless generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model_id: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResponse {
    pub text: String,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, RequestFailure>;

    /// Model identifier sent with every request
    fn model_id(&self) -> &str;
}
