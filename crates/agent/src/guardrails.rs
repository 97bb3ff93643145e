//! The buyer guardrail pipeline.
//!
//! Seven deterministic stages run in a fixed order over the generator's draft, followed
//! by a final no-self-repeat check. Stages are total text-to-text rewrites; only the
//! cap enforcement stage looks at the [`PolicyDecision`]. Every rewrite is recorded as a
//! [`GuardrailIntervention`] so callers can log why a line changed.

use pitchsim_core::classifier::{classify, Classification};
use pitchsim_core::domain::{Conversation, Scenario, Speaker, Vertical};
use pitchsim_core::memory::Memory;
use pitchsim_core::policy::{PivotScope, PolicyDecision};
use pitchsim_core::rules::{collapse_whitespace, normalize, RuleBook};
use rand::Rng;
use serde::Serialize;

use crate::lines::{
    acceptance_line, Rotation, ACCESS_ACKNOWLEDGED_LINE, ACCESS_TRANSITION_LINE,
    BUYER_ROLE_LINE, CLARIFICATION_LINE, REDIRECT_LINE,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailStage {
    DeferralStrip,
    RestrictedTopicOnce,
    TopicRepeat,
    AntiRepeat,
    CapEnforcement,
    RoleLeak,
    VerticalSanitize,
    NoSelfRepeat,
}

impl GuardrailStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeferralStrip => "deferral_strip",
            Self::RestrictedTopicOnce => "restricted_topic_once",
            Self::TopicRepeat => "topic_repeat",
            Self::AntiRepeat => "anti_repeat",
            Self::CapEnforcement => "cap_enforcement",
            Self::RoleLeak => "role_leak",
            Self::VerticalSanitize => "vertical_sanitize",
            Self::NoSelfRepeat => "no_self_repeat",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuardrailIntervention {
    pub stage: GuardrailStage,
    pub reason_code: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuardrailOutcome {
    pub text: String,
    pub interventions: Vec<GuardrailIntervention>,
}

/// Everything the pipeline reads for one reply.
#[derive(Clone, Copy, Debug)]
pub struct GuardrailInput<'a> {
    pub scenario: &'a Scenario,
    pub conversation: &'a Conversation,
    pub memory: &'a Memory,
    pub decision: PolicyDecision,
    pub candidate: &'a str,
    /// Generator acceptance draft; only consulted on `ForceAccept`.
    pub acceptance_draft: Option<&'a str>,
}

pub struct GuardrailPipeline<'r> {
    rules: &'r RuleBook,
}

impl<'r> GuardrailPipeline<'r> {
    pub fn new(rules: &'r RuleBook) -> Self {
        Self { rules }
    }

    pub fn apply<R: Rng + ?Sized>(&self, input: &GuardrailInput<'_>, rng: &mut R) -> GuardrailOutcome {
        let previous_buyer_line = input.conversation.last_from(Speaker::Buyer);
        let mut run = PipelineRun { text: String::new(), interventions: Vec::new() };

        run.text = self.strip_deferrals(input.candidate, &mut run.interventions);
        self.restricted_topic_once(input, &mut run);
        self.topic_repeat(input, previous_buyer_line, rng, &mut run);
        anti_repeat(previous_buyer_line, rng, &mut run);
        self.enforce_caps(input, previous_buyer_line, rng, &mut run);
        self.role_leak(&mut run);
        self.sanitize_vertical(input.scenario.vertical, &mut run);
        no_self_repeat(input, previous_buyer_line, rng, &mut run);

        GuardrailOutcome { text: run.text, interventions: run.interventions }
    }

    fn classify(&self, text: &str) -> Classification {
        classify(self.rules, text)
    }

    fn strip_deferrals(&self, candidate: &str, interventions: &mut Vec<GuardrailIntervention>) -> String {
        let stripped = self.rules.strip_trailing_deferrals(candidate);
        if stripped.is_empty() {
            interventions.push(GuardrailIntervention {
                stage: GuardrailStage::DeferralStrip,
                reason_code: "empty_after_strip",
            });
            return CLARIFICATION_LINE.to_string();
        }
        if stripped != collapse_whitespace(candidate) {
            interventions.push(GuardrailIntervention {
                stage: GuardrailStage::DeferralStrip,
                reason_code: "trailing_deferral",
            });
        }
        stripped
    }

    fn restricted_topic_once(&self, input: &GuardrailInput<'_>, run: &mut PipelineRun) {
        if !input.scenario.vertical.permits_restricted_topic() {
            return;
        }
        if !self.classify(&run.text).mentions_restricted_topic {
            return;
        }
        if input.memory.restricted_topic_resolved {
            run.replace(GuardrailStage::RestrictedTopicOnce, "restricted_topic_resolved", ACCESS_TRANSITION_LINE);
        } else if input.memory.restricted_topic_raised {
            run.replace(GuardrailStage::RestrictedTopicOnce, "restricted_topic_repeated", ACCESS_ACKNOWLEDGED_LINE);
        }
    }

    fn topic_repeat<R: Rng + ?Sized>(
        &self,
        input: &GuardrailInput<'_>,
        previous_buyer_line: Option<&str>,
        rng: &mut R,
        run: &mut PipelineRun,
    ) {
        let classification = self.classify(&run.text);
        if classification.is_objection
            && classification.topic.is_recognized()
            && input.memory.topic_count(classification.topic) >= 2
        {
            let line = Rotation::MoveOn.pick(rng, previous_buyer_line);
            run.replace(GuardrailStage::TopicRepeat, "topic_exhausted", line);
        }
    }

    fn enforce_caps<R: Rng + ?Sized>(
        &self,
        input: &GuardrailInput<'_>,
        previous_buyer_line: Option<&str>,
        rng: &mut R,
        run: &mut PipelineRun,
    ) {
        let vertical = input.scenario.vertical;
        match input.decision {
            PolicyDecision::Continue => {}
            PolicyDecision::ForceAccept => {
                match input.acceptance_draft.and_then(|draft| self.usable_acceptance(vertical, draft)) {
                    Some(draft) => run.replace(GuardrailStage::CapEnforcement, "accept_close", &draft),
                    None => run.replace(
                        GuardrailStage::CapEnforcement,
                        "accept_close_fallback",
                        acceptance_line(vertical),
                    ),
                }
            }
            PolicyDecision::PivotTopic(PivotScope::AllObjections) => {
                if self.classify(&run.text).is_objection {
                    let line = Rotation::Cooperative(vertical).pick(rng, previous_buyer_line);
                    run.replace(GuardrailStage::CapEnforcement, "objection_cap_reached", line);
                }
            }
            PolicyDecision::PivotTopic(PivotScope::Topic(topic)) => {
                let classification = self.classify(&run.text);
                if classification.is_objection && classification.topic == topic {
                    let line = Rotation::MoveOn.pick(rng, previous_buyer_line);
                    run.replace(GuardrailStage::CapEnforcement, "topic_pivot", line);
                }
            }
        }
    }

    /// Scrubbed acceptance draft, or `None` when it would not read as an acceptance.
    fn usable_acceptance(&self, vertical: Vertical, draft: &str) -> Option<String> {
        let scrubbed = self.rules.scrub_robotic_filler(draft);
        if scrubbed.is_empty() {
            return None;
        }
        let classification = self.classify(&scrubbed);
        let off_vertical =
            classification.mentions_restricted_topic && !vertical.permits_restricted_topic();
        if classification.is_objection || off_vertical || self.rules.is_role_leak(&normalize(&scrubbed)) {
            return None;
        }
        Some(scrubbed)
    }

    fn role_leak(&self, run: &mut PipelineRun) {
        if self.rules.is_role_leak(&normalize(&run.text)) {
            run.replace(GuardrailStage::RoleLeak, "rep_phrasing", BUYER_ROLE_LINE);
        }
    }

    fn sanitize_vertical(&self, vertical: Vertical, run: &mut PipelineRun) {
        if !vertical.permits_restricted_topic() && self.classify(&run.text).mentions_restricted_topic {
            run.replace(GuardrailStage::VerticalSanitize, "restricted_vocabulary", REDIRECT_LINE);
        }
    }
}

struct PipelineRun {
    text: String,
    interventions: Vec<GuardrailIntervention>,
}

impl PipelineRun {
    fn replace(&mut self, stage: GuardrailStage, reason_code: &'static str, line: &str) {
        self.text = line.to_string();
        self.interventions.push(GuardrailIntervention { stage, reason_code });
    }
}

fn anti_repeat<R: Rng + ?Sized>(previous_buyer_line: Option<&str>, rng: &mut R, run: &mut PipelineRun) {
    if repeats(previous_buyer_line, &run.text) {
        let line = Rotation::Concreteness.pick(rng, previous_buyer_line);
        run.replace(GuardrailStage::AntiRepeat, "repeat_of_previous_line", line);
    }
}

fn no_self_repeat<R: Rng + ?Sized>(
    input: &GuardrailInput<'_>,
    previous_buyer_line: Option<&str>,
    rng: &mut R,
    run: &mut PipelineRun,
) {
    if run.text.trim().is_empty() {
        run.replace(GuardrailStage::NoSelfRepeat, "empty_output", CLARIFICATION_LINE);
    }
    if repeats(previous_buyer_line, &run.text) {
        let rotation = match input.decision {
            PolicyDecision::ForceAccept => Rotation::Acceptance(input.scenario.vertical),
            _ => Rotation::Concreteness,
        };
        let line = rotation.pick(rng, previous_buyer_line);
        run.replace(GuardrailStage::NoSelfRepeat, "repeat_of_previous_line", line);
    }
}

fn repeats(previous_buyer_line: Option<&str>, text: &str) -> bool {
    previous_buyer_line.map(|previous| normalize(previous) == normalize(text)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pitchsim_core::classifier::{classify, Topic};
    use pitchsim_core::domain::{Conversation, Difficulty, Scenario, Turn, Vertical};
    use pitchsim_core::memory::{build_memory, Memory};
    use pitchsim_core::policy::{PivotScope, PolicyDecision};
    use pitchsim_core::rules::RuleBook;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{GuardrailInput, GuardrailOutcome, GuardrailPipeline, GuardrailStage};
    use crate::lines::{
        acceptance_line, Rotation, ACCESS_ACKNOWLEDGED_LINE, ACCESS_TRANSITION_LINE,
        BUYER_ROLE_LINE, CLARIFICATION_LINE, REDIRECT_LINE,
    };

    fn rules() -> RuleBook {
        RuleBook::builtin().expect("built-in rules")
    }

    struct Case {
        scenario: Scenario,
        conversation: Conversation,
        memory: Memory,
        decision: PolicyDecision,
    }

    impl Case {
        fn new(vertical: Vertical, turns: Vec<Turn>) -> Self {
            let scenario = Scenario::new(vertical, Difficulty::Medium);
            let conversation = Conversation::new(turns);
            let memory = build_memory(&rules(), &scenario, &conversation);
            Self { scenario, conversation, memory, decision: PolicyDecision::Continue }
        }

        fn run(&self, candidate: &str, acceptance_draft: Option<&str>) -> GuardrailOutcome {
            let rules = rules();
            let pipeline = GuardrailPipeline::new(&rules);
            pipeline.apply(
                &GuardrailInput {
                    scenario: &self.scenario,
                    conversation: &self.conversation,
                    memory: &self.memory,
                    decision: self.decision,
                    candidate,
                    acceptance_draft,
                },
                &mut StdRng::seed_from_u64(11),
            )
        }
    }

    fn stages(outcome: &GuardrailOutcome) -> Vec<GuardrailStage> {
        outcome.interventions.iter().map(|intervention| intervention.stage).collect()
    }

    #[test]
    fn clean_candidate_passes_untouched() {
        let case = Case::new(Vertical::Tech, vec![Turn::rep("We cut alert noise in half.")]);
        let outcome = case.run("Interesting. How long does onboarding usually take?", None);
        assert_eq!(outcome.text, "Interesting. How long does onboarding usually take?");
        assert!(outcome.interventions.is_empty());
    }

    #[test]
    fn trailing_deferrals_are_stripped() {
        let case = Case::new(Vertical::B2b, vec![Turn::rep("Here's the overview.")]);
        let outcome = case.run("That's helpful. Let\u{2019}s keep going.", None);
        assert_eq!(outcome.text, "That's helpful.");
        assert_eq!(stages(&outcome), vec![GuardrailStage::DeferralStrip]);
    }

    #[test]
    fn candidate_made_only_of_deferrals_becomes_clarification() {
        let case = Case::new(Vertical::B2b, vec![Turn::rep("Any questions?")]);
        let outcome = case.run("What's next? Let's move on.", None);
        assert_eq!(outcome.text, CLARIFICATION_LINE);
    }

    #[test]
    fn resolved_coverage_is_not_raised_again_in_pharma() {
        let case = Case::new(
            Vertical::Pharma,
            vec![
                Turn::rep("Hi doctor."),
                Turn::buyer("What's the coverage situation?"),
                Turn::rep("It's covered on most plans and we handle prior auth."),
            ],
        );
        let outcome = case.run("But what about prior authorization for my patients?", None);
        assert_eq!(outcome.text, ACCESS_TRANSITION_LINE);
        assert_eq!(outcome.interventions[0].stage, GuardrailStage::RestrictedTopicOnce);
    }

    #[test]
    fn repeated_unresolved_coverage_is_acknowledged() {
        let case = Case::new(
            Vertical::Pharma,
            vec![Turn::rep("Hi doctor."), Turn::buyer("Is it on formulary?"), Turn::rep("Good question.")],
        );
        assert_eq!(case.run("And the copay?", None).text, ACCESS_ACKNOWLEDGED_LINE);
    }

    #[test]
    fn first_coverage_question_is_allowed_in_pharma() {
        let case = Case::new(Vertical::Pharma, vec![Turn::rep("Hi doctor, quick minute?")]);
        let outcome = case.run("Sure. How does coverage look for this?", None);
        assert_eq!(outcome.text, "Sure. How does coverage look for this?");
    }

    #[test]
    fn exhausted_topic_moves_on() {
        let case = Case::new(
            Vertical::B2b,
            vec![
                Turn::rep("Hello"),
                Turn::buyer("The price is high."),
                Turn::rep("It pays back in a quarter."),
                Turn::buyer("Budget is still tight."),
                Turn::rep("We can phase it."),
            ],
        );
        let outcome = case.run("Honestly the cost is my main worry.", None);
        assert!(Rotation::MoveOn.lines().contains(&outcome.text.as_str()));
        assert_eq!(outcome.interventions[0].stage, GuardrailStage::TopicRepeat);
    }

    #[test]
    fn exact_repeat_is_replaced_by_concreteness_line() {
        let case = Case::new(
            Vertical::Tech,
            vec![Turn::rep("Hi"), Turn::buyer("How long is onboarding?"), Turn::rep("Two weeks.")],
        );
        let outcome = case.run("  how LONG is onboarding? ", None);
        assert!(Rotation::Concreteness.lines().contains(&outcome.text.as_str()));
        assert_eq!(stages(&outcome), vec![GuardrailStage::AntiRepeat]);
    }

    #[test]
    fn force_accept_uses_scrubbed_acceptance_draft() {
        let mut case = Case::new(Vertical::B2b, vec![Turn::rep("Let's get started now")]);
        case.decision = PolicyDecision::ForceAccept;
        let outcome =
            case.run("The price is still too high.", Some("Sounds good. Let's book the kickoff for Monday."));
        assert_eq!(outcome.text, "Let's book the kickoff for Monday.");
    }

    #[test]
    fn force_accept_rejects_objectionable_or_empty_drafts() {
        let mut case = Case::new(Vertical::Tech, vec![Turn::rep("Ready to sign?")]);
        case.decision = PolicyDecision::ForceAccept;
        for draft in [None, Some("Sounds good."), Some("Fine, but the price worries me.")] {
            let outcome = case.run("I need more proof.", draft);
            assert_eq!(outcome.text, acceptance_line(Vertical::Tech), "{draft:?}");
        }
    }

    #[test]
    fn spent_cap_turns_objection_into_cooperation() {
        let mut case = Case::new(Vertical::Pharma, vec![Turn::rep("Any other concerns?")]);
        case.decision = PolicyDecision::PivotTopic(PivotScope::AllObjections);
        let outcome = case.run("I worry about side effects in older patients.", None);
        assert!(Rotation::Cooperative(Vertical::Pharma).lines().contains(&outcome.text.as_str()));

        let passthrough = case.run("Tell me about dosing.", None);
        assert_eq!(passthrough.text, "Tell me about dosing.");
    }

    #[test]
    fn topic_pivot_only_fires_for_that_topic() {
        let mut case = Case::new(Vertical::Tech, vec![Turn::rep("We support SSO.")]);
        case.memory = Memory {
            objection_count_by_topic: BTreeMap::from([(Topic::Integration, 1)]),
            total_objections: 1,
            ..Memory::default()
        };
        case.decision = PolicyDecision::PivotTopic(PivotScope::Topic(Topic::Integration));

        let pivoted = case.run("Does it integrate with Okta?", None);
        assert!(Rotation::MoveOn.lines().contains(&pivoted.text.as_str()));
        assert_eq!(pivoted.interventions[0].stage, GuardrailStage::CapEnforcement);

        let kept = case.run("What about the price?", None);
        assert_eq!(kept.text, "What about the price?");
    }

    #[test]
    fn rep_phrasing_is_replaced_with_buyer_role_line() {
        let case = Case::new(Vertical::DoorToDoor, vec![Turn::rep("Hi, got a minute?")]);
        for candidate in ["Let me walk you through it.", "I'll send over the materials tonight."] {
            assert_eq!(case.run(candidate, None).text, BUYER_ROLE_LINE, "{candidate}");
        }
    }

    #[test]
    fn non_pharma_verticals_never_mention_coverage() {
        let rules = rules();
        for vertical in [Vertical::B2b, Vertical::DoorToDoor, Vertical::Tech] {
            let case = Case::new(vertical, vec![Turn::rep("Questions?")]);
            let outcome = case.run("Does my insurance formulary cover this?", None);
            assert_eq!(outcome.text, REDIRECT_LINE);
            assert!(!classify(&rules, &outcome.text).mentions_restricted_topic);
        }
    }

    #[test]
    fn final_line_never_repeats_previous_buyer_turn() {
        let mut case = Case::new(
            Vertical::B2b,
            vec![
                Turn::rep("Ready to move forward?"),
                Turn::buyer(acceptance_line(Vertical::B2b)),
                Turn::rep("Great, let's get started now."),
            ],
        );
        case.decision = PolicyDecision::ForceAccept;
        let outcome = case.run("Price is too high.", None);
        assert_ne!(outcome.text, acceptance_line(Vertical::B2b));
        assert!(Rotation::Acceptance(Vertical::B2b).lines().contains(&outcome.text.as_str()));
        assert_eq!(outcome.interventions.last().map(|i| i.stage), Some(GuardrailStage::NoSelfRepeat));
    }

    #[test]
    fn fixed_line_repeat_is_swapped_after_sanitizing() {
        let case = Case::new(
            Vertical::Tech,
            vec![Turn::rep("Questions?"), Turn::buyer(REDIRECT_LINE), Turn::rep("Fair.")],
        );
        let outcome = case.run("What about the payer side?", None);
        assert_ne!(outcome.text, REDIRECT_LINE);
        assert!(Rotation::Concreteness.lines().contains(&outcome.text.as_str()));
    }
}
