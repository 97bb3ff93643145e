//! Topic and intent classification for single lines of dialogue.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rules::{normalize, RuleBook};

/// Subject of a buyer objection. Declaration order is the default rule priority.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Price,
    Evidence,
    /// Insurance coverage / prior authorization; the restricted topic.
    Coverage,
    Time,
    Fit,
    Risk,
    Integration,
    Other,
}

impl Topic {
    pub const ALL: [Topic; 8] = [
        Self::Price,
        Self::Evidence,
        Self::Coverage,
        Self::Time,
        Self::Fit,
        Self::Risk,
        Self::Integration,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Evidence => "evidence",
            Self::Coverage => "coverage",
            Self::Time => "time",
            Self::Fit => "fit",
            Self::Risk => "risk",
            Self::Integration => "integration",
            Self::Other => "other",
        }
    }

    /// `false` only for the no-match fallback.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub topic: Topic,
    pub is_objection: bool,
    pub is_close_attempt: bool,
    pub mentions_restricted_topic: bool,
}

pub fn classify(rules: &RuleBook, text: &str) -> Classification {
    let normalized = normalize(text);
    let topic = rules.topic_of(&normalized);

    Classification {
        topic,
        is_objection: topic.is_recognized() || rules.is_objection(&normalized),
        is_close_attempt: rules.is_close_attempt(&normalized),
        mentions_restricted_topic: rules.mentions_restricted_topic(&normalized),
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, Classification, Topic};
    use crate::rules::RuleBook;

    fn rules() -> RuleBook {
        RuleBook::builtin().expect("built-in rules")
    }

    #[test]
    fn recognized_topic_always_implies_objection() {
        let rules = rules();
        // "afford" and "jira" are topic vocabulary but not in the broad objection pattern.
        for text in ["we can't afford another tool", "how does this work with jira"] {
            let classification = classify(&rules, text);
            assert!(classification.topic.is_recognized(), "{text}");
            assert!(classification.is_objection, "{text}");
        }
    }

    #[test]
    fn objection_without_topic_is_allowed() {
        let classification = classify(&rules(), "Just send me info and I'll look at it.");
        assert_eq!(classification.topic, Topic::Other);
        assert!(classification.is_objection);
    }

    #[test]
    fn neutral_line_has_no_intents() {
        let classification = classify(&rules(), "Good morning, thanks for stopping by.");
        assert_eq!(
            classification,
            Classification {
                topic: Topic::Other,
                is_objection: false,
                is_close_attempt: false,
                mentions_restricted_topic: false,
            }
        );
    }

    #[test]
    fn detects_close_attempts() {
        let rules = rules();
        for text in [
            "Let's get started now",
            "Are you ready to move forward?",
            "I can send the paperwork today",
            "Let\u{2019}s schedule the kickoff for Tuesday",
            "Want to start a pilot?",
        ] {
            assert!(classify(&rules, text).is_close_attempt, "{text}");
        }
        assert!(!classify(&rules, "Tell me about your practice").is_close_attempt);
    }

    #[test]
    fn restricted_mention_is_independent_of_topic() {
        let classification =
            classify(&rules(), "The cost is fine but what does the formulary look like?");
        assert_eq!(classification.topic, Topic::Price);
        assert!(classification.mentions_restricted_topic);
    }

    #[test]
    fn classification_is_idempotent() {
        let rules = rules();
        let text = "Honestly   the PRICE is too high for our budget.";
        assert_eq!(classify(&rules, text), classify(&rules, text));
        assert_eq!(classify(&rules, text).topic, Topic::Price);
    }
}
