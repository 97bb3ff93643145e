//! Prompt text for the buyer and acceptance completions.

use pitchsim_core::domain::{Conversation, Scenario, Turn, Vertical};
use pitchsim_core::memory::Memory;
use pitchsim_core::policy::ObjectionCaps;

use crate::llm::{ChatMessage, CompletionRequest};

pub const BUYER_TEMPERATURE: f32 = 1.2;
pub const BUYER_TOP_P: f32 = 0.95;
pub const BUYER_MAX_TOKENS: u32 = 250;
pub const ACCEPTANCE_TEMPERATURE: f32 = 1.1;
pub const ACCEPTANCE_MAX_TOKENS: u32 = 60;

pub fn buyer_request(
    scenario: &Scenario,
    memory: &Memory,
    caps: ObjectionCaps,
    recent: &[Turn],
) -> CompletionRequest {
    CompletionRequest {
        system: buyer_system_prompt(scenario, caps),
        messages: vec![ChatMessage::user(buyer_user_prompt(scenario, memory, caps, recent))],
        temperature: BUYER_TEMPERATURE,
        top_p: Some(BUYER_TOP_P),
        max_tokens: BUYER_MAX_TOKENS,
    }
}

pub fn acceptance_request(scenario: &Scenario, recent: &[Turn]) -> CompletionRequest {
    CompletionRequest {
        system: acceptance_system_prompt(scenario),
        messages: vec![ChatMessage::user(format!(
            "Recent conversation:\n{}\n\nWrite only your one-sentence acceptance now.",
            Conversation::transcript(recent)
        ))],
        temperature: ACCEPTANCE_TEMPERATURE,
        top_p: None,
        max_tokens: ACCEPTANCE_MAX_TOKENS,
    }
}

fn buyer_system_prompt(scenario: &Scenario, caps: ObjectionCaps) -> String {
    let role = match scenario.vertical {
        Vertical::Pharma => "You are the prescriber (HCP) being called on.",
        _ => "You are the BUYER being pitched.",
    };
    let mut prompt = format!(
        "{role} Speak like a real person in 1-2 sentences.\n\
         Mirror the rep's tone exactly: \"{tone}\". Use contractions and varied rhythm.\n\
         \n\
         Ground rules:\n\
         - You are the buyer. Never sell back or pitch the product yourself.\n\
         - Avoid deferral fillers such as \"let's keep going\" or \"what's the next step from your end\".\n\
         - Do not repeat a topic the rep already answered; acknowledge it and move forward.\n",
        tone = scenario.effective_tone(),
    );
    if scenario.vertical.permits_restricted_topic() {
        prompt.push_str(
            "- Coverage or prior authorization comes up at most once; once the rep addresses it, drop it.\n",
        );
    } else {
        prompt.push_str("- Never bring up insurance, coverage or prior authorization.\n");
    }
    prompt.push_str(&format!(
        "- Raise between {} and {} objections in total. Once you reach {}, accept a close \
         attempt or agree to a small first step in the same tone.",
        caps.min_cap, caps.max_cap, caps.max_cap
    ));
    prompt
}

fn buyer_user_prompt(
    scenario: &Scenario,
    memory: &Memory,
    caps: ObjectionCaps,
    recent: &[Turn],
) -> String {
    let topic_counts = serde_json::to_string(&memory.objection_count_by_topic)
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "SCENARIO:\n\
         - Vertical: {vertical}\n\
         - Difficulty: {difficulty}\n\
         - Product: {product}\n\
         - Persona: {persona}\n\
         \n\
         STATE:\n\
         - Objections so far: {total} (cap {cap})\n\
         - Asked about coverage already? {raised}\n\
         - Rep said coverage is handled? {resolved}\n\
         - Topic counts: {topic_counts}\n\
         \n\
         RECENT DIALOGUE:\n\
         {dialogue}\n\
         \n\
         Write ONLY your next buyer line (1-2 sentences).",
        vertical = scenario.vertical,
        difficulty = scenario.difficulty,
        product = scenario.product,
        persona = scenario.persona,
        total = memory.total_objections,
        cap = caps.max_cap,
        raised = yes_no(memory.restricted_topic_raised),
        resolved = yes_no(memory.restricted_topic_resolved),
        dialogue = Conversation::transcript(recent),
    )
}

fn acceptance_system_prompt(scenario: &Scenario) -> String {
    let instruction = match scenario.vertical {
        Vertical::Pharma => "Agree to start one or two suitable new patients this week.",
        _ => "Agree to a light, reversible first step (pilot, paperwork, or an initial order).",
    };
    format!(
        "You are the BUYER. Write ONE short, natural sentence that ACCEPTS the rep's close.\n\
         Match the conversation tone \"{tone}\" without sounding robotic.\n\
         No sales pitch. No emojis.\n\
         {instruction}",
        tone = scenario.effective_tone(),
    )
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
