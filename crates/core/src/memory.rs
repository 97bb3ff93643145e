//! Conversation memory: a summary folded from the full history on every call.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classifier::{classify, Topic};
use crate::domain::{Conversation, Scenario, Speaker};
use crate::rules::{normalize, RuleBook};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Memory {
    /// Buyer lines per recognized topic. `Topic::Other` is never counted.
    pub objection_count_by_topic: BTreeMap<Topic, u32>,
    /// Buyer lines classified as objections, whether or not a topic was recognized.
    pub total_objections: u32,
    pub restricted_topic_raised: bool,
    pub restricted_topic_resolved: bool,
}

impl Memory {
    pub fn topic_count(&self, topic: Topic) -> u32 {
        self.objection_count_by_topic.get(&topic).copied().unwrap_or(0)
    }
}

pub fn build_memory(rules: &RuleBook, scenario: &Scenario, conversation: &Conversation) -> Memory {
    let restricted_vertical = scenario.vertical.permits_restricted_topic();
    let mut memory = Memory::default();

    for line in conversation.lines_from(Speaker::Buyer) {
        let classification = classify(rules, line);
        if classification.is_objection {
            memory.total_objections += 1;
        }
        if classification.topic.is_recognized() {
            *memory.objection_count_by_topic.entry(classification.topic).or_insert(0) += 1;
        }
        if restricted_vertical && classification.mentions_restricted_topic {
            memory.restricted_topic_raised = true;
        }
    }

    if restricted_vertical {
        let rep_text = conversation.lines_from(Speaker::Rep).collect::<Vec<_>>().join("\n");
        memory.restricted_topic_resolved = rules.is_restricted_resolution(&normalize(&rep_text));
    }

    memory
}
