/// Reply generation for the chat session
///
/// The session depends only on the `ReplyEngine` trait, so the canned mock and a
/// real HTTP backend are interchangeable without touching session code.
///
/// # Architecture
///
/// - `mock` - Canned responses after a simulated, randomized delay
/// - `http` - JSON chat endpoint over reqwest
mod http;
mod mock;

pub use http::HttpReplyEngine;
pub use mock::{ELABORATION_SUFFIX, MockReplyEngine, RESPONSE_CATALOG};

use crate::types::ChatMessage;
use async_trait::async_trait;
use std::time::Duration;

// ============================================
// Error Types
// ============================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("reply timed out after {0:?}")]
    Timeout(Duration),

    #[error("chat endpoint error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend returned an empty reply")]
    EmptyReply,
}

impl From<reqwest::Error> for ReplyError {
    fn from(err: reqwest::Error) -> Self {
        ReplyError::Transport(err.to_string())
    }
}

pub type ReplyResult<T> = Result<T, ReplyError>;

/// Produces the assistant's answer to a prompt.
///
/// `history` holds the messages that precede the prompt, oldest first. Implementations
/// never touch session state.
#[async_trait]
pub trait ReplyEngine: Send + Sync {
    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> ReplyResult<String>;
}
