//! Client-side chat core: an ordered, persisted conversation, a swappable reply
//! engine, and the session state machine that ties them together.
//!
//! Rendering is left to the caller, which forwards intents (`submit`, `reset`) and
//! re-renders from `ChatSession::subscribe`.

pub mod ai;
pub mod config;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;

pub use ai::{HttpReplyEngine, MockReplyEngine, ReplyEngine, ReplyError};
pub use config::ChatConfig;
pub use session::{ChatSession, PendingReply, ReplyOutcome, SubmitError};
pub use store::MessageStore;
pub use types::{ChatMessage, ChatState, ChatSummary, NoticeLevel, Notification, Role};
