//! Integration tests for the persistence layer
//!
//! Tests the file-backed key-value store and message snapshot round-trips

use blueocean::storage::{FileStore, KeyValueStore, MemoryStore};
use blueocean::store::MessageStore;
use blueocean::{ChatMessage, Role};
use std::sync::Arc;
use time::OffsetDateTime;

mod file_store_tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = FileStore::new(dir.path());
        let value = r#"{"version":1,"messages":[]}"#;

        store.set("chat", value).expect("Failed to set storage");
        assert_eq!(store.get("chat").unwrap(), Some(value.to_string()));
    }

    #[test]
    fn test_get_nonexistent() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = FileStore::new(dir.path().join("never-created"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = FileStore::new(dir.path());

        store.set("chat", "value").expect("Failed to set");
        store.remove("chat").expect("Failed to remove");
        assert!(store.get("chat").unwrap().is_none());
        store.remove("chat").expect("Second remove should be a no-op");
    }

    #[test]
    fn test_special_characters_in_key() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = FileStore::new(dir.path());

        store.set("user:chat/1", "dark").expect("Failed to set");
        assert_eq!(store.get("user:chat/1").unwrap(), Some("dark".to_string()));
        assert!(store.get("user_chat_1").unwrap().is_none());
        let files: Vec<_> = std::fs::read_dir(dir.path())
            .expect("Failed to list dir")
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("user_chat_1-"));
        assert!(files[0].ends_with(".json"));
    }

    #[test]
    fn test_keys_are_isolated() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = FileStore::new(dir.path());

        store.set("chat-a", "a").expect("Failed to set a");
        store.set("chat-b", "b").expect("Failed to set b");
        store.remove("chat-a").expect("Failed to remove a");

        assert!(store.get("chat-a").unwrap().is_none());
        assert_eq!(store.get("chat-b").unwrap(), Some("b".to_string()));
    }
}

mod snapshot_tests {
    use super::*;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).unwrap()
    }

    #[test]
    fn test_round_trip_through_files() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let backend: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir.path()));

        let mut store = MessageStore::open(backend.clone(), "blueocean-chat-messages");
        store.append(ChatMessage::new(Role::User, "hello", at(100)));
        store.append(ChatMessage::new(
            Role::Assistant,
            "First paragraph.\n\nSecond paragraph.",
            at(101),
        ));
        let before = store.all().to_vec();
        drop(store);

        // Simulated restart.
        let reopened = MessageStore::open(
            Arc::new(FileStore::new(dir.path())),
            "blueocean-chat-messages",
        );
        let after = reopened.all();
        assert_eq!(after.len(), 2);
        for (old, new) in before.iter().zip(after) {
            assert_eq!(old.role(), new.role());
            assert_eq!(old.content(), new.content());
            assert_eq!(old.created_at(), new.created_at());
        }
    }

    #[test]
    fn test_corrupt_snapshot_loads_empty() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .set("chat", "{not json at all")
            .expect("Failed to seed");

        let store = MessageStore::open(backend, "chat");
        assert!(store.is_empty());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_replaced_by_next_append() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        backend.set("chat", "[1, 2, 3]").expect("Failed to seed");

        let mut store = MessageStore::open(backend.clone(), "chat");
        store.append(ChatMessage::new(Role::User, "fresh start", at(5)));

        let reloaded = MessageStore::open(backend, "chat");
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.all()[0].content(), "fresh start");
    }

    #[test]
    fn test_clear_removes_snapshot_and_is_idempotent() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut store = MessageStore::open(backend.clone(), "chat");
        store.append(ChatMessage::new(Role::User, "bye", at(1)));

        store.clear();
        assert!(store.is_empty());
        assert!(backend.get("chat").unwrap().is_none());

        store.clear();
        assert!(store.is_empty());
        assert!(MessageStore::open(backend, "chat").is_empty());
    }

    #[test]
    fn test_ids_are_regenerated_on_load() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut store = MessageStore::open(backend.clone(), "chat");
        store.append(ChatMessage::new(Role::User, "hello", at(1)));

        let reloaded = MessageStore::open(backend, "chat");
        assert_ne!(reloaded.all()[0].id(), store.all()[0].id());
        assert_eq!(reloaded.all()[0].content(), "hello");
    }
}
