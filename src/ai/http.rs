use super::{ReplyEngine, ReplyError, ReplyResult};
use crate::types::{ChatMessage, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend for a JSON chat endpoint: `POST {message, messages}` answered by `{reply}`.
pub struct HttpReplyEngine {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpReplyEngine {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> ReplyResult<Self> {
        Self::with_timeout(endpoint, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> ReplyResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            timeout,
        })
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct ReplyOnly {
    reply: String,
}

#[derive(Deserialize)]
struct ContentOnly {
    content: String,
}

/// Accepts `{reply}`, then `{content}`, then the raw body.
pub(crate) fn parse_reply_body(body: &str) -> ReplyResult<String> {
    let text = if let Ok(parsed) = serde_json::from_str::<ReplyOnly>(body) {
        parsed.reply
    } else if let Ok(parsed) = serde_json::from_str::<ContentOnly>(body) {
        parsed.content
    } else {
        body.to_string()
    };

    if text.trim().is_empty() {
        Err(ReplyError::EmptyReply)
    } else {
        Ok(text)
    }
}

#[async_trait]
impl ReplyEngine for HttpReplyEngine {
    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> ReplyResult<String> {
        let payload = ChatRequest {
            message: prompt,
            messages: history
                .iter()
                .map(|msg| WireMessage {
                    role: msg.role(),
                    content: msg.content(),
                })
                .collect(),
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ReplyError::Timeout(self.timeout)
            } else {
                ReplyError::from(err)
            }
        })?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            parse_reply_body(&body)
        } else {
            Err(ReplyError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
