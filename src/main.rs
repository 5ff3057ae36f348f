use blueocean::{ChatConfig, ChatState, NoticeLevel, Role};
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};

fn init_tracing() {
    let level = std::env::var("CHAT_LOG_LEVEL")
        .ok()
        .and_then(|raw| tracing::Level::from_str(&raw).ok())
        .unwrap_or(tracing::Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// What the terminal has already printed.
#[derive(Default)]
struct Transcript {
    shown: usize,
    first_id: Option<String>,
    was_pending: bool,
}

impl Transcript {
    /// Lines for whatever changed since the last call.
    fn update(&mut self, state: &ChatState) -> Vec<String> {
        let mut lines = Vec::new();
        let first_id = state.messages.first().map(|msg| msg.id().to_string());
        // Updates can merge, so a reset followed by new messages may not shrink the count.
        if self.shown > 0 && (state.messages.len() < self.shown || first_id != self.first_id) {
            lines.push("-- new chat --".to_string());
            self.shown = 0;
        }
        for msg in &state.messages[self.shown..] {
            let who = match msg.role() {
                Role::User => "You",
                Role::Assistant => "AI",
            };
            let time = msg.display_time().unwrap_or_default();
            lines.push(format!("[{time}] {who}: {}", msg.content()));
        }
        self.shown = state.messages.len();
        self.first_id = first_id;
        if state.pending && !self.was_pending {
            lines.push("AI is typing…".to_string());
        }
        self.was_pending = state.pending;
        lines
    }
}

async fn render_loop(mut states: watch::Receiver<ChatState>) {
    let mut transcript = Transcript::default();
    loop {
        let state = states.borrow_and_update().clone();
        for line in transcript.update(&state) {
            println!("{line}");
        }
        if states.changed().await.is_err() {
            break;
        }
    }
}

async fn notice_loop(mut notices: broadcast::Receiver<blueocean::Notification>) {
    loop {
        match notices.recv().await {
            Ok(notice) if notice.level == NoticeLevel::Error => eprintln!("! {}", notice.text),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ChatConfig::from_env();
    let session = config.open_session()?;

    println!("blueocean chat. Type a message; /new starts over, /quit exits.");
    let renderer = tokio::spawn(render_loop(session.subscribe()));
    let notifier = tokio::spawn(notice_loop(session.notifications()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/new" => session.reset(),
            _ => {
                // Empty text or a pending reply: ignored, like a disabled send button.
                let _ = session.submit(&line);
            }
        }
    }

    drop(session);
    renderer.abort();
    notifier.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueocean::ChatMessage;
    use time::OffsetDateTime;

    fn state(messages: Vec<ChatMessage>, pending: bool) -> ChatState {
        ChatState { messages, pending }
    }

    fn message(role: Role, content: &str) -> ChatMessage {
        ChatMessage::new(role, content, OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn test_prints_only_new_messages() {
        let mut transcript = Transcript::default();
        let first = message(Role::User, "hello");
        assert_eq!(transcript.update(&state(vec![first.clone()], true)).len(), 2);

        let lines = transcript.update(&state(vec![first, message(Role::Assistant, "hi")], false));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("AI: hi"));
    }

    #[test]
    fn test_detects_new_chat_with_same_length() {
        let mut transcript = Transcript::default();
        transcript.update(&state(
            vec![message(Role::User, "old"), message(Role::Assistant, "old reply")],
            false,
        ));

        // Reset, submit and reply merged into one update.
        let lines = transcript.update(&state(
            vec![message(Role::User, "new"), message(Role::Assistant, "new reply")],
            false,
        ));
        assert_eq!(lines[0], "-- new chat --");
        assert!(lines[1].ends_with("You: new"));
        assert!(lines[2].ends_with("AI: new reply"));
    }

    #[test]
    fn test_detects_cleared_chat() {
        let mut transcript = Transcript::default();
        transcript.update(&state(vec![message(Role::User, "old")], false));
        assert_eq!(transcript.update(&state(Vec::new(), false)), vec!["-- new chat --"]);
    }
}
