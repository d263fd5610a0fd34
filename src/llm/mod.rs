pub mod openai;
pub mod structured;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::{LlmClient, LlmConfig};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing api key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<LlmUsage>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// Anything that can answer a chat-style prompt. Every component that talks
/// to the model goes through this so it can be swapped for a scripted double.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[LlmMessage]) -> Result<LlmResponse, LlmError>;
}

/// Turns text into vectors for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
}

/// Convenience for the common system + user prompt shape.
pub async fn ask(
    llm: &dyn ChatModel,
    system: &str,
    user: impl Into<String>,
) -> Result<String, LlmError> {
    let messages = [LlmMessage::system(system), LlmMessage::user(user)];
    llm.chat(&messages).await.map(|resp| resp.text)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned replies in order; an exhausted script or an `Err` entry
    /// behaves like a provider outage.
    pub struct ScriptedModel {
        replies: Vec<Result<String, String>>,
        index: AtomicUsize,
        seen: Mutex<Vec<Vec<LlmMessage>>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<String, String>>) -> Self {
            Self {
                replies,
                index: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        pub fn failing() -> Self {
            Self::new(Vec::new())
        }

        pub fn calls(&self) -> usize {
            self.index.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<Vec<LlmMessage>> {
            self.seen.lock().map(|g| g.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: &[LlmMessage]) -> Result<LlmResponse, LlmError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(messages.to_vec());
            }
            let i = self.index.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(i) {
                Some(Ok(text)) => Ok(LlmResponse {
                    text: text.clone(),
                    usage: None,
                }),
                Some(Err(err)) => Err(LlmError::Http(err.clone())),
                None => Err(LlmError::Http(format!("script exhausted after {i} calls"))),
            }
        }
    }

    /// One axis per topic word list; an input scores on an axis for every
    /// word of that topic it contains.
    pub struct ScriptedEmbedder {
        topics: Vec<Vec<&'static str>>,
        calls: AtomicUsize,
    }

    impl ScriptedEmbedder {
        pub fn new(topics: Vec<Vec<&'static str>>) -> Self {
            Self {
                topics,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for ScriptedEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs
                .iter()
                .map(|text| {
                    self.topics
                        .iter()
                        .map(|words| words.iter().filter(|w| text.contains(*w)).count() as f32)
                        .collect()
                })
                .collect())
        }
    }
}
