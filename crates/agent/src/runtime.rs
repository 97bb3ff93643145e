//! Per-request orchestration: memory, policy, generator, guardrails.
//!
//! The runtime is stateless between calls. Everything it decides is rebuilt from the
//! conversation in the request, so a single `Arc<BuyerRuntime>` serves every session.

use std::sync::Arc;
use std::time::Duration;

use pitchsim_core::config::AppConfig;
use pitchsim_core::domain::{Conversation, Scenario, Speaker, Turn};
use pitchsim_core::errors::ApplicationError;
use pitchsim_core::memory::{build_memory, Memory};
use pitchsim_core::policy::{decide, CapTable, PolicyDecision};
use pitchsim_core::rules::RuleBook;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::generator::{CandidateGenerator, LlmCandidateGenerator, OfflineGenerator, Unavailable};
use crate::guardrails::{GuardrailInput, GuardrailIntervention, GuardrailPipeline};
use crate::lines::{CLARIFICATION_LINE, WAITING_LINE};
use crate::llm::{provider_name, HttpLlmClient};

/// Inbound request, parsed leniently.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuyerRequest {
    pub scenario: Scenario,
    pub conversation: Conversation,
    pub session_id: Option<String>,
}

impl BuyerRequest {
    pub fn new(scenario: Scenario, conversation: Conversation) -> Self {
        Self { scenario, conversation, session_id: None }
    }

    /// Returns `None` only when `body` is not a JSON object. Unknown scenario values fall
    /// back to defaults and malformed messages are dropped.
    pub fn from_json(body: &[u8]) -> Option<Self> {
        let value = serde_json::from_slice::<Value>(body).ok()?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let scenario = object
            .get("scenario")
            .and_then(|scenario| serde_json::from_value::<Scenario>(scenario.clone()).ok())
            .unwrap_or_default();
        let conversation = object
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|message| serde_json::from_value::<Turn>(message.clone()).ok())
                    .collect::<Conversation>()
            })
            .unwrap_or_default();
        let session_id = object
            .get("session_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|session_id| !session_id.is_empty())
            .map(str::to_string);

        Some(Self { scenario, conversation, session_id })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    /// No rep turn yet; nothing was generated.
    Waiting,
    Generator,
    /// The generator was unavailable and the clarification line was used.
    Fallback,
}

/// Final buyer line plus the trail of how it was produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BuyerReply {
    pub text: String,
    pub source: ReplySource,
    pub decision: Option<PolicyDecision>,
    pub memory: Option<Memory>,
    pub interventions: Vec<GuardrailIntervention>,
    pub unavailable: Vec<Unavailable>,
}

impl BuyerReply {
    fn waiting() -> Self {
        Self {
            text: WAITING_LINE.to_string(),
            source: ReplySource::Waiting,
            decision: None,
            memory: None,
            interventions: Vec::new(),
            unavailable: Vec::new(),
        }
    }
}

pub struct BuyerRuntime {
    rules: Arc<RuleBook>,
    caps: CapTable,
    generator: Arc<dyn CandidateGenerator>,
}

impl BuyerRuntime {
    pub fn new(rules: RuleBook, caps: CapTable, generator: Arc<dyn CandidateGenerator>) -> Self {
        Self { rules: Arc::new(rules), caps, generator }
    }

    /// Wires the rule book, caps and generator from configuration. Missing credentials
    /// select the offline generator instead of failing.
    pub fn from_config(config: &AppConfig) -> Result<Self, ApplicationError> {
        let rules = RuleBook::load_or_builtin(config.engine.rules_path.as_deref())?;
        let caps = config.caps.table()?;

        let generator: Arc<dyn CandidateGenerator> = if config.llm.has_credentials() {
            let client = HttpLlmClient::from_config(&config.llm)
                .map_err(|error| ApplicationError::Integration(error.to_string()))?;
            Arc::new(LlmCandidateGenerator::new(
                client,
                config.engine.history_window,
                config.engine.acceptance_window,
                Duration::from_secs(config.llm.timeout_secs),
            ))
        } else {
            warn!(
                event_name = "agent.runtime.offline_generator",
                correlation_id = "bootstrap",
                provider = provider_name(config.llm.provider),
                "no llm credentials configured; buyer replies will use fallback lines"
            );
            Arc::new(OfflineGenerator)
        };

        Ok(Self::new(rules, caps, generator))
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub fn caps(&self) -> &CapTable {
        &self.caps
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    pub async fn reply(&self, request: &BuyerRequest, correlation_id: &str) -> BuyerReply {
        self.reply_with_rng(request, correlation_id, &mut StdRng::from_entropy()).await
    }

    pub async fn reply_with_rng<R: Rng + Send + ?Sized>(
        &self,
        request: &BuyerRequest,
        correlation_id: &str,
        rng: &mut R,
    ) -> BuyerReply {
        let scenario = &request.scenario;
        let conversation = &request.conversation;

        if !conversation.has_rep_turn() {
            debug!(
                event_name = "agent.runtime.waiting",
                correlation_id,
                turns = conversation.len(),
                "no rep turn yet; returning waiting line"
            );
            return BuyerReply::waiting();
        }

        let memory = build_memory(&self.rules, scenario, conversation);
        let decision = decide(
            &self.rules,
            &self.caps,
            scenario,
            &memory,
            conversation.last_from(Speaker::Rep),
        );
        let caps = self.caps.caps(scenario.difficulty);
        let mut unavailable = Vec::new();

        let (candidate, source) =
            match self.generator.generate(scenario, conversation, &memory, caps).await {
                Ok(text) => (text, ReplySource::Generator),
                Err(reason) => {
                    log_unavailable(correlation_id, "primary", &reason);
                    unavailable.push(reason);
                    (CLARIFICATION_LINE.to_string(), ReplySource::Fallback)
                }
            };

        let acceptance_draft = if decision == PolicyDecision::ForceAccept {
            match self.generator.generate_acceptance(scenario, conversation).await {
                Ok(text) => Some(text),
                Err(reason) => {
                    log_unavailable(correlation_id, "acceptance", &reason);
                    unavailable.push(reason);
                    None
                }
            }
        } else {
            None
        };

        let outcome = GuardrailPipeline::new(&self.rules).apply(
            &GuardrailInput {
                scenario,
                conversation,
                memory: &memory,
                decision,
                candidate: &candidate,
                acceptance_draft: acceptance_draft.as_deref(),
            },
            rng,
        );

        for intervention in &outcome.interventions {
            debug!(
                event_name = "agent.guardrail.intervened",
                correlation_id,
                stage = intervention.stage.as_str(),
                reason_code = intervention.reason_code,
                "guardrail rewrote buyer line"
            );
        }
        info!(
            event_name = "agent.runtime.replied",
            correlation_id,
            vertical = scenario.vertical.as_str(),
            difficulty = scenario.difficulty.as_str(),
            total_objections = memory.total_objections,
            decision = ?decision,
            interventions = outcome.interventions.len(),
            generator = self.generator.name(),
            "buyer reply produced"
        );

        BuyerReply {
            text: outcome.text,
            source,
            decision: Some(decision),
            memory: Some(memory),
            interventions: outcome.interventions,
            unavailable,
        }
    }
}

fn log_unavailable(correlation_id: &str, call: &'static str, reason: &Unavailable) {
    warn!(
        event_name = "agent.generator.unavailable",
        correlation_id,
        call,
        reason_code = reason.reason_code(),
        error = %reason,
        "generator unavailable; using fallback line"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pitchsim_core::config::AppConfig;
    use pitchsim_core::domain::{Conversation, Difficulty, Scenario, Speaker, Turn, Vertical};
    use pitchsim_core::policy::{CapTable, PolicyDecision};
    use pitchsim_core::rules::RuleBook;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    use super::{BuyerRequest, BuyerRuntime, ReplySource};
    use crate::generator::{ScriptedGenerator, Unavailable};
    use crate::lines::{CLARIFICATION_LINE, WAITING_LINE};

    fn runtime(generator: ScriptedGenerator) -> BuyerRuntime {
        BuyerRuntime::new(
            RuleBook::builtin().expect("built-in rules"),
            CapTable::default(),
            Arc::new(generator),
        )
    }

    #[test]
    fn lenient_parsing_drops_bad_messages_and_defaults_scenario() {
        let body = json!({
            "scenario": { "vertical": "spaceships", "difficulty": "hard", "tone": 7 },
            "messages": [
                { "who": "you", "text": "Hi there" },
                { "who": "alien", "text": "??" },
                "not a turn",
                { "speaker": "buyer", "text": "Hello." },
                { "who": "doc" }
            ],
            "session_id": "  abc-123 "
        });

        let request = BuyerRequest::from_value(&body).expect("object body");
        assert_eq!(request.scenario.vertical, Vertical::B2b);
        assert_eq!(request.scenario.difficulty, Difficulty::Hard);
        assert_eq!(request.conversation.len(), 3);
        assert_eq!(request.conversation.turns()[2].speaker, Speaker::Buyer);
        assert_eq!(request.conversation.turns()[2].text, "");
        assert_eq!(request.session_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn non_object_bodies_are_rejected() {
        assert!(BuyerRequest::from_json(b"not json").is_none());
        assert!(BuyerRequest::from_json(b"[1,2,3]").is_none());
        let empty = BuyerRequest::from_json(b"{}").expect("empty object");
        assert!(empty.conversation.is_empty());
        assert_eq!(empty.scenario, Scenario::default());
    }

    #[tokio::test]
    async fn null_rep_text_still_counts_as_the_rep_speaking() {
        let request = BuyerRequest::from_json(br#"{"messages":[{"who":"you","text":null}]}"#)
            .expect("object body");
        assert_eq!(request.conversation.turns(), &[Turn::rep("")]);

        let runtime = runtime(ScriptedGenerator::new().with_draft("Sorry, who is this?"));
        let reply = runtime.reply_with_rng(&request, "test", &mut StdRng::seed_from_u64(5)).await;

        assert_ne!(reply.text, WAITING_LINE);
        assert_eq!(reply.source, ReplySource::Generator);
        assert_eq!(reply.decision, Some(PolicyDecision::Continue));
    }

    #[tokio::test]
    async fn waits_for_the_rep_without_calling_the_generator() {
        let runtime = runtime(ScriptedGenerator::new().with_draft("unused"));
        let request = BuyerRequest::new(
            Scenario::default(),
            Conversation::new(vec![Turn::buyer("Hello?")]),
        );

        let reply = runtime.reply(&request, "test").await;

        assert_eq!(reply.text, WAITING_LINE);
        assert_eq!(reply.source, ReplySource::Waiting);
        assert!(reply.decision.is_none());
    }

    #[tokio::test]
    async fn unavailable_generator_falls_back_to_clarification() {
        let runtime = runtime(
            ScriptedGenerator::new().with_failure(Unavailable::Timeout { timeout_secs: 20 }),
        );
        let request = BuyerRequest::new(
            Scenario::new(Vertical::Tech, Difficulty::Easy),
            Conversation::new(vec![Turn::rep("Hi, I'm calling about observability tooling.")]),
        );

        let reply = runtime.reply(&request, "test").await;

        assert_eq!(reply.text, CLARIFICATION_LINE);
        assert_eq!(reply.source, ReplySource::Fallback);
        assert_eq!(reply.unavailable, vec![Unavailable::Timeout { timeout_secs: 20 }]);
    }

    #[tokio::test]
    async fn acceptance_is_only_requested_on_forced_acceptance() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_draft("What does onboarding involve?")
                .with_acceptance("Okay, let's book the kickoff."),
        );
        let runtime = BuyerRuntime::new(
            RuleBook::builtin().expect("built-in rules"),
            CapTable::default(),
            generator.clone(),
        );
        let request = BuyerRequest::new(
            Scenario::new(Vertical::B2b, Difficulty::Medium),
            Conversation::new(vec![Turn::rep("Want to start a pilot?")]),
        );

        let reply = runtime.reply_with_rng(&request, "test", &mut StdRng::seed_from_u64(3)).await;

        assert_eq!(reply.decision, Some(PolicyDecision::Continue));
        assert_eq!(reply.text, "What does onboarding involve?");
        assert_eq!(generator.remaining_acceptances(), 1);
    }

    #[test]
    fn from_config_without_credentials_uses_offline_generator() {
        let mut config = AppConfig::default();
        config.llm.api_key = None;
        let runtime = BuyerRuntime::from_config(&config).expect("runtime");
        assert_eq!(runtime.generator_name(), "offline");
        assert_eq!(runtime.caps(), &CapTable::default());
    }
}
