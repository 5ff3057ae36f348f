use crate::ai::{HttpReplyEngine, MockReplyEngine, ReplyEngine};
use crate::session::ChatSession;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::store::{DEFAULT_STORAGE_KEY, MessageStore};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const DEFAULT_MIN_DELAY_MS: u64 = 1000;
const DEFAULT_DELAY_RANGE_MS: u64 = 2000;
const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 30;

/// Runtime settings, read from `CHAT_*` environment variables.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatConfig {
    pub storage_key: String,
    /// `None` means the platform data directory.
    pub storage_dir: Option<PathBuf>,
    pub persist: bool,
    pub min_delay: Duration,
    pub delay_range: Duration,
    /// `None` disables the bound.
    pub reply_timeout: Option<Duration>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_dir: None,
            persist: true,
            min_delay: Duration::from_millis(DEFAULT_MIN_DELAY_MS),
            delay_range: Duration::from_millis(DEFAULT_DELAY_RANGE_MS),
            reply_timeout: Some(Duration::from_secs(DEFAULT_REPLY_TIMEOUT_SECS)),
            endpoint: None,
            api_key: None,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let number = |key: &str, default: u64| match read(key) {
            Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                warn!(key, value = %raw, default, "ignoring malformed number");
                default
            }),
            None => default,
        };

        let persist = read("CHAT_PERSIST")
            .map(|raw| {
                !matches!(
                    raw.to_ascii_lowercase().as_str(),
                    "0" | "false" | "no" | "off"
                )
            })
            .unwrap_or(true);
        let timeout_secs = number("CHAT_REPLY_TIMEOUT_SECS", DEFAULT_REPLY_TIMEOUT_SECS);

        Self {
            storage_key: read("CHAT_STORAGE_KEY")
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string()),
            storage_dir: read("CHAT_STORAGE_DIR").map(PathBuf::from),
            persist,
            min_delay: Duration::from_millis(number(
                "CHAT_REPLY_MIN_DELAY_MS",
                DEFAULT_MIN_DELAY_MS,
            )),
            delay_range: Duration::from_millis(number(
                "CHAT_REPLY_DELAY_RANGE_MS",
                DEFAULT_DELAY_RANGE_MS,
            )),
            reply_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            endpoint: read("CHAT_ENDPOINT"),
            api_key: read("CHAT_API_KEY"),
        }
    }

    pub fn storage(&self) -> Arc<dyn KeyValueStore> {
        if !self.persist {
            return Arc::new(MemoryStore::new());
        }
        match &self.storage_dir {
            Some(dir) => Arc::new(FileStore::new(dir.clone())),
            None => Arc::new(FileStore::default_location()),
        }
    }

    /// `HttpReplyEngine` when an endpoint is configured, the canned mock otherwise.
    pub fn reply_engine(&self) -> Result<Arc<dyn ReplyEngine>> {
        if let Some(endpoint) = &self.endpoint {
            let timeout = self
                .reply_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_REPLY_TIMEOUT_SECS));
            let engine =
                HttpReplyEngine::with_timeout(endpoint.clone(), self.api_key.clone(), timeout)
                    .map_err(|e| {
                        anyhow::anyhow!("Failed to initialize chat endpoint client: {}", e)
                    })?;
            return Ok(Arc::new(engine));
        }
        Ok(Arc::new(MockReplyEngine::new(self.min_delay, self.delay_range)))
    }

    /// Hydrate the conversation from storage and wire it to the configured engine.
    pub fn open_session(&self) -> Result<ChatSession> {
        let store = MessageStore::open(self.storage(), self.storage_key.clone());
        let engine = self.reply_engine()?;
        Ok(ChatSession::with_reply_timeout(store, engine, self.reply_timeout))
    }
}
