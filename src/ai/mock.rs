use super::{ReplyEngine, ReplyResult};
use crate::types::ChatMessage;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_DELAY_RANGE: Duration = Duration::from_millis(2000);
const ELABORATION_CHANCE: f64 = 0.5;

pub const RESPONSE_CATALOG: [&str; 10] = [
    "That's an interesting question! Let me help you with that.",
    "I understand what you're looking for. Here's what I think...",
    "Great question! Based on my knowledge, I can suggest...",
    "I'd be happy to help you with that. Let me break it down...",
    "That's a complex topic. Let me provide some insights...",
    "I can definitely assist you with that. Here's my perspective...",
    "Interesting point! Let me share some thoughts on this...",
    "I'm here to help! Let me provide some guidance on that...",
    "That's a great question to explore. Here's what I know...",
    "I can help you work through this. Let me offer some suggestions...",
];

pub const ELABORATION_SUFFIX: &str = " This is additional information that would typically come from a real AI API. The response would be more detailed and specific to your actual question, providing comprehensive insights and actionable advice.";

/// Canned replies after a delay drawn uniformly from `min_delay..=min_delay + delay_range`.
pub struct MockReplyEngine {
    min_delay: Duration,
    delay_range: Duration,
    rng: Mutex<StdRng>,
}

impl MockReplyEngine {
    pub fn new(min_delay: Duration, delay_range: Duration) -> Self {
        Self {
            min_delay,
            delay_range,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Zero-latency engine with a fixed seed, for tests and demos.
    pub fn instant(seed: u64) -> Self {
        Self::new(Duration::ZERO, Duration::ZERO).with_seed(seed)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    fn draw(&self) -> (Duration, String) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let range_ms = u64::try_from(self.delay_range.as_millis()).unwrap_or(u64::MAX);
        let delay = self.min_delay + Duration::from_millis(rng.gen_range(0..=range_ms));
        (delay, compose_reply(&mut *rng))
    }
}

impl Default for MockReplyEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY, DEFAULT_DELAY_RANGE)
    }
}

fn compose_reply<R: Rng + ?Sized>(rng: &mut R) -> String {
    let base = RESPONSE_CATALOG
        .choose(rng)
        .copied()
        .unwrap_or(RESPONSE_CATALOG[0]);
    if rng.gen_bool(ELABORATION_CHANCE) {
        format!("{base}{ELABORATION_SUFFIX}")
    } else {
        base.to_string()
    }
}

#[async_trait]
impl ReplyEngine for MockReplyEngine {
    async fn generate(&self, prompt: &str, _history: &[ChatMessage]) -> ReplyResult<String> {
        let (delay, reply) = self.draw();
        debug!(prompt_chars = prompt.chars().count(), ?delay, "mock reply scheduled");
        tokio::time::sleep(delay).await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_catalog_reply(reply: &str) -> bool {
        let base = reply.strip_suffix(ELABORATION_SUFFIX).unwrap_or(reply);
        RESPONSE_CATALOG.contains(&base)
    }

    #[test]
    fn test_replies_come_from_catalog() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(is_catalog_reply(&compose_reply(&mut rng)));
        }
    }

    #[test]
    fn test_both_lengths_occur() {
        let mut rng = StdRng::seed_from_u64(42);
        let replies: Vec<String> = (0..200).map(|_| compose_reply(&mut rng)).collect();
        assert!(replies.iter().any(|r| r.ends_with(ELABORATION_SUFFIX)));
        assert!(replies.iter().any(|r| !r.ends_with(ELABORATION_SUFFIX)));
    }

    #[test]
    fn test_delay_stays_in_window() {
        let engine = MockReplyEngine::new(Duration::from_millis(1000), Duration::from_millis(2000))
            .with_seed(3);
        for _ in 0..100 {
            let (delay, _) = engine.draw();
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_waits_for_delay() {
        let engine = MockReplyEngine::new(Duration::from_secs(1), Duration::ZERO).with_seed(1);
        let started = tokio::time::Instant::now();
        let reply = engine.generate("hello", &[]).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(is_catalog_reply(&reply));
    }

    #[tokio::test]
    async fn test_same_seed_same_reply() {
        let a = MockReplyEngine::instant(9).generate("x", &[]).await.unwrap();
        let b = MockReplyEngine::instant(9).generate("x", &[]).await.unwrap();
        assert_eq!(a, b);
    }
}
