use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pitchsim_core::domain::{Conversation, Scenario};
use pitchsim_core::memory::Memory;
use pitchsim_core::policy::ObjectionCaps;
use serde::Serialize;
use thiserror::Error;

use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::prompts;

/// Why the generator produced no draft. Never surfaced to the caller; the runtime
/// substitutes a deterministic line.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailable {
    #[error("no generator credentials configured")]
    MissingCredentials,
    #[error("generator timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("generator transport failed: {message}")]
    Transport { message: String },
    #[error("generator upstream returned status {status}")]
    UpstreamStatus { status: u16 },
    #[error("generator returned a malformed payload: {message}")]
    Malformed { message: String },
    #[error("generator returned no text")]
    Empty,
}

impl Unavailable {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::Malformed { .. } => "malformed",
            Self::Empty => "empty",
        }
    }
}

impl From<LlmError> for Unavailable {
    fn from(error: LlmError) -> Self {
        match error {
            LlmError::MissingCredentials(_) => Self::MissingCredentials,
            LlmError::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            LlmError::Transport(message) => Self::Transport { message },
            LlmError::Status { status, .. } => Self::UpstreamStatus { status },
            LlmError::Malformed(message) => Self::Malformed { message },
            LlmError::Empty => Self::Empty,
        }
    }
}

/// Produces first-draft buyer text. Implementations may fail; they must not panic.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        scenario: &Scenario,
        conversation: &Conversation,
        memory: &Memory,
        caps: ObjectionCaps,
    ) -> Result<String, Unavailable>;

    async fn generate_acceptance(
        &self,
        scenario: &Scenario,
        conversation: &Conversation,
    ) -> Result<String, Unavailable>;
}

pub struct LlmCandidateGenerator<C> {
    client: C,
    history_window: usize,
    acceptance_window: usize,
    timeout: Duration,
}

impl<C: LlmClient> LlmCandidateGenerator<C> {
    pub fn new(client: C, history_window: usize, acceptance_window: usize, timeout: Duration) -> Self {
        Self { client, history_window, acceptance_window, timeout }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, Unavailable> {
        let text = tokio::time::timeout(self.timeout, self.client.complete(request))
            .await
            .map_err(|_| Unavailable::Timeout { timeout_secs: self.timeout.as_secs() })??;
        let text = text.trim();
        if text.is_empty() {
            return Err(Unavailable::Empty);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl<C: LlmClient> CandidateGenerator for LlmCandidateGenerator<C> {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn generate(
        &self,
        scenario: &Scenario,
        conversation: &Conversation,
        memory: &Memory,
        caps: ObjectionCaps,
    ) -> Result<String, Unavailable> {
        let request =
            prompts::buyer_request(scenario, memory, caps, conversation.recent(self.history_window));
        self.complete(&request).await
    }

    async fn generate_acceptance(
        &self,
        scenario: &Scenario,
        conversation: &Conversation,
    ) -> Result<String, Unavailable> {
        let request =
            prompts::acceptance_request(scenario, conversation.recent(self.acceptance_window));
        self.complete(&request).await
    }
}

/// Stand-in used when no credentials are configured; every call is unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl CandidateGenerator for OfflineGenerator {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn generate(
        &self,
        _scenario: &Scenario,
        _conversation: &Conversation,
        _memory: &Memory,
        _caps: ObjectionCaps,
    ) -> Result<String, Unavailable> {
        Err(Unavailable::MissingCredentials)
    }

    async fn generate_acceptance(
        &self,
        _scenario: &Scenario,
        _conversation: &Conversation,
    ) -> Result<String, Unavailable> {
        Err(Unavailable::MissingCredentials)
    }
}

/// Replays queued drafts in order. Drives the smoke checks and runtime tests.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    drafts: Mutex<VecDeque<Result<String, Unavailable>>>,
    acceptances: Mutex<VecDeque<Result<String, Unavailable>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draft(self, draft: impl Into<String>) -> Self {
        self.push(&self.drafts, Ok(draft.into()));
        self
    }

    pub fn with_failure(self, reason: Unavailable) -> Self {
        self.push(&self.drafts, Err(reason));
        self
    }

    pub fn with_acceptance(self, draft: impl Into<String>) -> Self {
        self.push(&self.acceptances, Ok(draft.into()));
        self
    }

    pub fn with_acceptance_failure(self, reason: Unavailable) -> Self {
        self.push(&self.acceptances, Err(reason));
        self
    }

    /// Number of queued primary drafts not yet consumed.
    pub fn remaining_drafts(&self) -> usize {
        self.drafts.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Number of queued acceptance drafts not yet consumed.
    pub fn remaining_acceptances(&self) -> usize {
        self.acceptances.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    fn push(
        &self,
        queue: &Mutex<VecDeque<Result<String, Unavailable>>>,
        entry: Result<String, Unavailable>,
    ) {
        if let Ok(mut queue) = queue.lock() {
            queue.push_back(entry);
        }
    }

    fn pop(queue: &Mutex<VecDeque<Result<String, Unavailable>>>) -> Result<String, Unavailable> {
        queue
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(Err(Unavailable::Empty))
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(
        &self,
        _scenario: &Scenario,
        _conversation: &Conversation,
        _memory: &Memory,
        _caps: ObjectionCaps,
    ) -> Result<String, Unavailable> {
        Self::pop(&self.drafts)
    }

    async fn generate_acceptance(
        &self,
        _scenario: &Scenario,
        _conversation: &Conversation,
    ) -> Result<String, Unavailable> {
        Self::pop(&self.acceptances)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use pitchsim_core::domain::{Conversation, Difficulty, Scenario, Turn};
    use pitchsim_core::memory::Memory;
    use pitchsim_core::policy::CapTable;

    use super::{CandidateGenerator, LlmCandidateGenerator, OfflineGenerator, ScriptedGenerator, Unavailable};
    use crate::llm::{CompletionRequest, LlmClient, LlmError};

    struct RecordingClient {
        reply: Result<String, LlmError>,
        delay: Duration,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingClient {
        fn replying(reply: Result<String, LlmError>) -> Self {
            Self { reply, delay: Duration::ZERO, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LlmClient for RecordingClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.seen.lock().expect("lock").push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone()
        }
    }

    fn long_conversation() -> Conversation {
        (0..20)
            .map(|index| {
                if index % 2 == 0 {
                    Turn::rep(format!("rep line {index}"))
                } else {
                    Turn::buyer(format!("buyer line {index}"))
                }
            })
            .collect()
    }

    fn caps() -> pitchsim_core::policy::ObjectionCaps {
        CapTable::default().caps(Difficulty::Medium)
    }

    #[tokio::test]
    async fn llm_generator_windows_history_and_trims_output() {
        let generator = LlmCandidateGenerator::new(
            RecordingClient::replying(Ok("  What's the onboarding like?  ".to_string())),
            14,
            10,
            Duration::from_secs(5),
        );
        let conversation = long_conversation();

        let draft = generator
            .generate(&Scenario::default(), &conversation, &Memory::default(), caps())
            .await;
        assert_eq!(draft, Ok("What's the onboarding like?".to_string()));

        let acceptance = generator.generate_acceptance(&Scenario::default(), &conversation).await;
        assert!(acceptance.is_ok());

        let seen = generator.client.seen.lock().expect("lock");
        let primary = &seen[0].messages[0].content;
        assert!(!primary.contains("rep line 4\n"), "turns before the window are dropped");
        assert!(primary.contains("Rep: rep line 6"));
        assert!(primary.contains("Buyer: buyer line 19"));
        let accept = &seen[1].messages[0].content;
        assert!(!accept.contains("rep line 8\n"));
        assert!(accept.contains("Rep: rep line 10"));
    }

    #[tokio::test]
    async fn llm_errors_map_to_unavailable_reasons() {
        let generator = LlmCandidateGenerator::new(
            RecordingClient::replying(Err(LlmError::Status { status: 503, body: "busy".to_string() })),
            14,
            10,
            Duration::from_secs(5),
        );
        let result =
            generator.generate(&Scenario::default(), &Conversation::default(), &Memory::default(), caps()).await;
        assert_eq!(result, Err(Unavailable::UpstreamStatus { status: 503 }));
        assert_eq!(result.err().map(|reason| reason.reason_code()), Some("upstream_status"));
    }

    #[tokio::test]
    async fn blank_completion_is_empty() {
        let generator = LlmCandidateGenerator::new(
            RecordingClient::replying(Ok("   ".to_string())),
            14,
            10,
            Duration::from_secs(5),
        );
        let result = generator.generate_acceptance(&Scenario::default(), &Conversation::default()).await;
        assert_eq!(result, Err(Unavailable::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_client_times_out() {
        let mut client = RecordingClient::replying(Ok("late".to_string()));
        client.delay = Duration::from_secs(30);
        let generator = LlmCandidateGenerator::new(client, 14, 10, Duration::from_secs(2));

        let result =
            generator.generate(&Scenario::default(), &Conversation::default(), &Memory::default(), caps()).await;
        assert_eq!(result, Err(Unavailable::Timeout { timeout_secs: 2 }));
    }

    #[tokio::test]
    async fn offline_generator_is_always_unavailable() {
        let generator = OfflineGenerator;
        assert_eq!(
            generator.generate_acceptance(&Scenario::default(), &Conversation::default()).await,
            Err(Unavailable::MissingCredentials)
        );
    }

    #[tokio::test]
    async fn scripted_generator_replays_in_order_then_reports_empty() {
        let generator = ScriptedGenerator::new()
            .with_draft("first")
            .with_failure(Unavailable::Transport { message: "reset".to_string() })
            .with_acceptance("Deal.");
        let scenario = Scenario::default();
        let conversation = Conversation::default();
        let memory = Memory::default();

        assert_eq!(generator.generate(&scenario, &conversation, &memory, caps()).await, Ok("first".to_string()));
        assert!(generator.generate(&scenario, &conversation, &memory, caps()).await.is_err());
        assert_eq!(generator.generate(&scenario, &conversation, &memory, caps()).await, Err(Unavailable::Empty));
        assert_eq!(generator.remaining_acceptances(), 1);
        assert_eq!(generator.generate_acceptance(&scenario, &conversation).await, Ok("Deal.".to_string()));
        assert_eq!(generator.remaining_drafts(), 0);
    }
}
