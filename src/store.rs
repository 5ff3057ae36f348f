//! Ordered message log with a best-effort persisted snapshot.
//!
//! The in-memory sequence is authoritative for a running session. The snapshot is
//! rewritten after every append and read once when the store is opened; a missing,
//! unreadable or corrupt snapshot hydrates as an empty conversation.

use crate::storage::KeyValueStore;
use crate::types::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub const DEFAULT_STORAGE_KEY: &str = "blueocean-chat-messages";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRecord {
    role: Role,
    content: String,
    /// Unix milliseconds.
    created_at: i64,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u32,
    messages: Vec<SnapshotRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSnapshot {
    Versioned(SnapshotEnvelope),
    Unversioned(Vec<SnapshotRecord>),
}

pub struct MessageStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    /// Open the store and hydrate it from the persisted snapshot.
    pub fn open(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let mut store = Self {
            backend,
            key: key.into(),
            messages: Vec::new(),
        };
        store.messages = store.load();
        store
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted snapshot. Never fails: absent or corrupt data yields an empty sequence.
    pub fn load(&self) -> Vec<ChatMessage> {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(key = %self.key, error = %err, "failed to read chat snapshot");
                return Vec::new();
            }
        };

        match decode_snapshot(&raw) {
            Ok(messages) => {
                debug!(key = %self.key, count = messages.len(), "loaded chat snapshot");
                messages
            }
            Err(reason) => {
                warn!(key = %self.key, %reason, "discarding unreadable chat snapshot");
                Vec::new()
            }
        }
    }

    /// Append at the end and rewrite the snapshot. A failed write is logged; the
    /// in-memory append stands.
    pub fn append(&mut self, message: ChatMessage) {
        debug_assert!(
            self.messages
                .last()
                .is_none_or(|last| last.created_at() <= message.created_at()),
            "createdAt must not decrease"
        );
        self.messages.push(message);
        self.persist();
    }

    /// Empty the sequence and drop the snapshot. Clearing an empty store is a no-op.
    pub fn clear(&mut self) {
        self.messages.clear();
        if let Err(err) = self.backend.remove(&self.key) {
            warn!(key = %self.key, error = %err, "failed to remove chat snapshot");
        }
    }

    pub fn all(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Creation time for the next message, never earlier than the last one.
    ///
    /// Truncated to the millisecond so it survives the snapshot unchanged.
    pub fn next_timestamp(&self) -> OffsetDateTime {
        let now = truncate_to_millis(OffsetDateTime::now_utc());
        match self.messages.last() {
            Some(last) if last.created_at() > now => last.created_at(),
            _ => now,
        }
    }

    fn persist(&self) {
        let envelope = SnapshotEnvelope {
            version: SNAPSHOT_VERSION,
            messages: self.messages.iter().map(to_record).collect(),
        };
        let encoded = match serde_json::to_string(&envelope) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key = %self.key, error = %err, "failed to encode chat snapshot");
                return;
            }
        };
        if let Err(err) = self.backend.set(&self.key, &encoded) {
            warn!(key = %self.key, error = %err, "failed to save chat snapshot");
        }
    }
}

fn truncate_to_millis(at: OffsetDateTime) -> OffsetDateTime {
    at - time::Duration::nanoseconds(i64::from(at.nanosecond() % 1_000_000))
}

fn to_record(message: &ChatMessage) -> SnapshotRecord {
    let millis = message.created_at().unix_timestamp_nanos() / 1_000_000;
    SnapshotRecord {
        role: message.role(),
        content: message.content().to_string(),
        created_at: millis as i64,
    }
}

fn decode_snapshot(raw: &str) -> Result<Vec<ChatMessage>, String> {
    let records = match serde_json::from_str::<StoredSnapshot>(raw).map_err(|e| e.to_string())? {
        StoredSnapshot::Versioned(envelope) if envelope.version == SNAPSHOT_VERSION => {
            envelope.messages
        }
        StoredSnapshot::Versioned(envelope) => {
            return Err(format!("unsupported snapshot version {}", envelope.version));
        }
        StoredSnapshot::Unversioned(records) => records,
    };

    let mut messages: Vec<ChatMessage> = Vec::with_capacity(records.len());
    for record in records {
        if record.content.trim().is_empty() {
            return Err("snapshot contains an empty message".to_string());
        }
        let nanos = i128::from(record.created_at) * 1_000_000;
        let mut created_at = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|e| format!("invalid createdAt {}: {e}", record.created_at))?;
        if let Some(previous) = messages.last()
            && previous.created_at() > created_at
        {
            created_at = previous.created_at();
        }
        messages.push(ChatMessage::new(record.role, record.content, created_at));
    }
    Ok(messages)
}
