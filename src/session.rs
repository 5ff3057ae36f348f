//! Chat session state machine.
//!
//! `Idle` (no reply outstanding) and `AwaitingReply` (one reply outstanding). A submit
//! appends the user message and spawns the reply; the completion appends the assistant
//! message only if the session generation is unchanged, so a reply that outlives a
//! `reset` is dropped instead of resurrecting the cleared conversation.

use crate::ai::{ReplyEngine, ReplyError};
use crate::store::MessageStore;
use crate::types::{ChatMessage, ChatState, ChatSummary, Notification, Role};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error. Please try again.";
pub const REPLY_SENT_NOTICE: &str = "Message sent successfully!";
pub const REPLY_FAILED_NOTICE: &str = "Failed to send message. Please try again.";
pub const CHAT_CLEARED_NOTICE: &str = "Chat cleared";

const NOTIFICATION_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("message is empty")]
    EmptyInput,

    #[error("a reply is still pending")]
    ReplyPending,

    #[error("no tokio runtime to run the reply on")]
    NoRuntime,
}

/// How an accepted submission ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// The reply was appended.
    Replied,
    /// The engine failed; the fallback message was appended instead.
    Failed(ReplyError),
    /// The session was reset (or dropped) first; nothing was appended.
    Discarded,
}

/// Handle on the reply spawned by an accepted `submit`.
#[derive(Debug)]
pub struct PendingReply {
    handle: JoinHandle<ReplyOutcome>,
}

impl PendingReply {
    pub async fn wait(self) -> ReplyOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                if !err.is_cancelled() {
                    warn!(error = %err, "reply task ended abnormally");
                }
                ReplyOutcome::Discarded
            }
        }
    }
}

struct SessionState {
    store: MessageStore,
    pending: bool,
    generation: u64,
    in_flight: Option<AbortHandle>,
}

impl SessionState {
    fn snapshot(&self) -> ChatState {
        ChatState {
            messages: self.store.all().to_vec(),
            pending: self.pending,
        }
    }
}

struct SessionInner {
    state: Mutex<SessionState>,
    engine: Arc<dyn ReplyEngine>,
    reply_timeout: Option<Duration>,
    state_tx: watch::Sender<ChatState>,
    notice_tx: broadcast::Sender<Notification>,
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Called with the lock held so subscribers observe transitions in order.
    fn publish(&self, state: &SessionState) {
        self.state_tx.send_replace(state.snapshot());
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.notice_tx.send(notification);
    }

    async fn complete(
        &self,
        generation: u64,
        prompt: String,
        history: Vec<ChatMessage>,
    ) -> ReplyOutcome {
        let generated = self.engine.generate(&prompt, &history);
        let result = match self.reply_timeout {
            Some(limit) => tokio::time::timeout(limit, generated)
                .await
                .unwrap_or(Err(ReplyError::Timeout(limit))),
            None => generated.await,
        };
        let result = result.and_then(|reply| {
            if reply.trim().is_empty() {
                Err(ReplyError::EmptyReply)
            } else {
                Ok(reply)
            }
        });

        let (outcome, notification) = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!(
                    generation,
                    current = state.generation,
                    "discarding reply for a reset conversation"
                );
                return ReplyOutcome::Discarded;
            }

            let (content, outcome, notification) = match result {
                Ok(reply) => (
                    reply,
                    ReplyOutcome::Replied,
                    Notification::success(REPLY_SENT_NOTICE),
                ),
                Err(err) => {
                    warn!(generation, error = %err, "reply failed; appending fallback");
                    (
                        FALLBACK_REPLY.to_string(),
                        ReplyOutcome::Failed(err),
                        Notification::error(REPLY_FAILED_NOTICE),
                    )
                }
            };

            let created_at = state.store.next_timestamp();
            state
                .store
                .append(ChatMessage::new(Role::Assistant, content, created_at));
            state.pending = false;
            state.in_flight = None;
            self.publish(&state);
            (outcome, notification)
        };

        self.notify(notification);
        outcome
    }
}

/// One conversation: its ordered history, the pending flag, and the reply engine.
///
/// Dropping the session aborts any reply still in flight.
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Start `Idle` with the history hydrated by `store`.
    pub fn new(store: MessageStore, engine: Arc<dyn ReplyEngine>) -> Self {
        Self::with_reply_timeout(store, engine, None)
    }

    /// Like `new`, with a bounded wait on the engine; expiry counts as a reply failure.
    pub fn with_reply_timeout(
        store: MessageStore,
        engine: Arc<dyn ReplyEngine>,
        reply_timeout: Option<Duration>,
    ) -> Self {
        let state = SessionState {
            store,
            pending: false,
            generation: 0,
            in_flight: None,
        };
        let (state_tx, _) = watch::channel(state.snapshot());
        let (notice_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        info!(
            key = %state.store.key(),
            messages = state.store.len(),
            "chat session started"
        );
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(state),
                engine,
                reply_timeout,
                state_tx,
                notice_tx,
            }),
        }
    }

    /// Send a user message. The reply runs on the current tokio runtime.
    ///
    /// Rejected, without any state change, when the trimmed text is empty, a reply
    /// is already pending, or there is no runtime to run the reply on.
    pub fn submit(&self, text: &str) -> Result<PendingReply, SubmitError> {
        let prompt = text.trim();
        if prompt.is_empty() {
            debug!("ignoring empty submit");
            return Err(SubmitError::EmptyInput);
        }

        let runtime = Handle::try_current().map_err(|err| {
            warn!(error = %err, "submit called outside a tokio runtime");
            SubmitError::NoRuntime
        })?;

        let mut state = self.inner.lock();
        if state.pending {
            debug!("ignoring submit while a reply is pending");
            return Err(SubmitError::ReplyPending);
        }

        let history = state.store.all().to_vec();
        let created_at = state.store.next_timestamp();
        state
            .store
            .append(ChatMessage::new(Role::User, prompt, created_at));
        state.pending = true;
        self.inner.publish(&state);

        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        let prompt = prompt.to_string();
        let handle =
            runtime.spawn(async move { inner.complete(generation, prompt, history).await });
        state.in_flight = Some(handle.abort_handle());
        Ok(PendingReply { handle })
    }

    /// Clear the conversation and its snapshot. Valid in either state; an outstanding
    /// reply is orphaned and will not be appended.
    pub fn reset(&self) {
        {
            let mut state = self.inner.lock();
            state.generation += 1;
            if let Some(in_flight) = state.in_flight.take() {
                in_flight.abort();
            }
            state.pending = false;
            state.store.clear();
            info!(generation = state.generation, "chat session reset");
            self.inner.publish(&state);
        }
        self.inner.notify(Notification::success(CHAT_CLEARED_NOTICE));
    }

    pub fn state(&self) -> ChatState {
        self.inner.lock().snapshot()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().store.all().to_vec()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending
    }

    pub fn summary(&self) -> Option<ChatSummary> {
        ChatSummary::from_messages(self.inner.lock().store.all())
    }

    /// Receives a fresh `ChatState` after every transition.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.inner.state_tx.subscribe()
    }

    /// Toasts: reply sent, reply failed, chat cleared.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notice_tx.subscribe()
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        if let Some(in_flight) = state.in_flight.take() {
            in_flight.abort();
        }
    }
}
