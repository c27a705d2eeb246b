use uuid::Uuid;

use buddha_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Failed to parse LLM response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("LLM returned no choices")]
    EmptyResponse,
    #[error("LLM stream interrupted: {0}")]
    Stream(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Agent not found: {0}")]
    NotFound(Uuid),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Agent did not finish within {0} tool rounds")]
    TooManySteps(usize),
}

impl AgentError {
    /// Map a store `NotFound` to the agent-level variant.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => AgentError::NotFound(id),
            other => AgentError::Store(other),
        }
    }
}
