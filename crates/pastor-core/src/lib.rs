pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::{FailureKind, GeminiClient, GenerationRequest, GenerationResponse, GenerationService, RequestFailure};
pub use config::Config;
pub use conversation::Conversation;
pub use error::ConfigError;
pub use orchestrator::{Orchestrator, Outcome, PendingRequest, Rejected};
pub use prompt::PromptTemplate;
pub use session::{Phase, SessionState};
pub use state::{Message, MessageId, Sender};
