//! Data-driven pattern rules for the buyer engine.
//!
//! The rule book is a TOML document compiled once into regular expressions. A built-in
//! copy ships with the crate; operators can point `engine.rules_path` at a replacement.
//! Every predicate here expects text already passed through [`normalize`], except the
//! two rewriting helpers which operate on raw generator output.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use thiserror::Error;

use crate::classifier::Topic;

const BUILTIN_RULES: &str = include_str!("default_rules.toml");

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleBookError {
    #[error("could not read rule book `{path}`: {message}")]
    Read { path: PathBuf, message: String },
    #[error("could not parse rule book: {0}")]
    Parse(String),
    #[error("rule `{rule}` is not a valid pattern: {message}")]
    InvalidPattern { rule: String, message: String },
    #[error("topic `{0}` has more than one rule")]
    DuplicateTopic(Topic),
    #[error("topic `other` is the no-match fallback and cannot have a rule")]
    FallbackTopicRule,
    #[error("rule book must list at least one deferral phrase")]
    NoDeferrals,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleBookDocument {
    objection: String,
    close_attempt: String,
    restricted_topic: String,
    restricted_resolution: String,
    role_leak: String,
    robotic_filler: String,
    deferrals: Vec<String>,
    topics: Vec<TopicRuleDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TopicRuleDocument {
    topic: Topic,
    pattern: String,
}

#[derive(Clone, Debug)]
pub struct TopicRule {
    topic: Topic,
    pattern: Regex,
}

impl TopicRule {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn matches(&self, normalized: &str) -> bool {
        self.pattern.is_match(normalized)
    }
}

#[derive(Clone, Debug)]
pub struct RuleBook {
    topics: Vec<TopicRule>,
    objection: Regex,
    close_attempt: Regex,
    restricted_topic: Regex,
    restricted_resolution: Regex,
    role_leak: Regex,
    robotic_filler: Regex,
    trailing_deferral: Regex,
}

impl RuleBook {
    pub fn builtin() -> Result<Self, RuleBookError> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    pub fn load(path: &Path) -> Result<Self, RuleBookError> {
        let raw = fs::read_to_string(path).map_err(|error| RuleBookError::Read {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Uses the file at `path` when given, the built-in rules otherwise.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, RuleBookError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RuleBookError> {
        let document = toml::from_str::<RuleBookDocument>(raw)
            .map_err(|error| RuleBookError::Parse(error.to_string()))?;
        Self::compile(document)
    }

    fn compile(document: RuleBookDocument) -> Result<Self, RuleBookError> {
        let mut seen = BTreeSet::new();
        let mut topics = Vec::with_capacity(document.topics.len());
        for rule in document.topics {
            if rule.topic == Topic::Other {
                return Err(RuleBookError::FallbackTopicRule);
            }
            if !seen.insert(rule.topic) {
                return Err(RuleBookError::DuplicateTopic(rule.topic));
            }
            let pattern = compile_pattern(&format!("topics.{}", rule.topic), &rule.pattern)?;
            topics.push(TopicRule { topic: rule.topic, pattern });
        }

        if document.deferrals.iter().all(|phrase| phrase.trim().is_empty()) {
            return Err(RuleBookError::NoDeferrals);
        }

        Ok(Self {
            topics,
            objection: compile_pattern("objection", &document.objection)?,
            close_attempt: compile_pattern("close_attempt", &document.close_attempt)?,
            restricted_topic: compile_pattern("restricted_topic", &document.restricted_topic)?,
            restricted_resolution: compile_pattern(
                "restricted_resolution",
                &document.restricted_resolution,
            )?,
            role_leak: compile_pattern("role_leak", &document.role_leak)?,
            robotic_filler: compile_pattern("robotic_filler", &document.robotic_filler)?,
            trailing_deferral: compile_pattern(
                "deferrals",
                &trailing_deferral_pattern(&document.deferrals),
            )?,
        })
    }

    /// Topic rules in priority order.
    pub fn topic_rules(&self) -> &[TopicRule] {
        &self.topics
    }

    pub fn topic_of(&self, normalized: &str) -> Topic {
        self.topics
            .iter()
            .find(|rule| rule.matches(normalized))
            .map(TopicRule::topic)
            .unwrap_or(Topic::Other)
    }

    pub fn is_objection(&self, normalized: &str) -> bool {
        self.objection.is_match(normalized)
    }

    pub fn is_close_attempt(&self, normalized: &str) -> bool {
        self.close_attempt.is_match(normalized)
    }

    pub fn mentions_restricted_topic(&self, normalized: &str) -> bool {
        self.restricted_topic.is_match(normalized)
    }

    pub fn is_restricted_resolution(&self, normalized: &str) -> bool {
        self.restricted_resolution.is_match(normalized)
    }

    pub fn is_role_leak(&self, normalized: &str) -> bool {
        self.role_leak.is_match(normalized)
    }

    /// Removes deferral phrases that close out the text, keeping the punctuation of the
    /// clause before them.
    pub fn strip_trailing_deferrals(&self, text: &str) -> String {
        let mut current = collapse_whitespace(text);
        loop {
            let stripped = self.trailing_deferral.replace(&current, "${1}");
            let stripped = collapse_whitespace(
                stripped.trim_end_matches(|character: char| character == ',' || character.is_whitespace()),
            );
            if stripped == current {
                return current;
            }
            current = stripped;
        }
    }

    /// Drops stock filler ("sounds good", "that works for me") from generated text.
    pub fn scrub_robotic_filler(&self, text: &str) -> String {
        collapse_whitespace(&self.robotic_filler.replace_all(text, ""))
    }
}

/// Lower-cases, folds typographic apostrophes, collapses whitespace and trims.
pub fn normalize(text: &str) -> String {
    let folded = text
        .chars()
        .map(|character| match character {
            '\u{2018}' | '\u{2019}' | '\u{02bc}' => '\'',
            other => other,
        })
        .collect::<String>()
        .to_lowercase();
    collapse_whitespace(&folded)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compile_pattern(rule: &str, pattern: &str) -> Result<Regex, RuleBookError> {
    RegexBuilder::new(pattern).case_insensitive(true).build().map_err(|error| {
        RuleBookError::InvalidPattern { rule: rule.to_string(), message: error.to_string() }
    })
}

/// `(^|[.?!,])\s*(?:phrase|...)[.?!]*\s*$`; apostrophes are optional and may be curly.
fn trailing_deferral_pattern(phrases: &[String]) -> String {
    let alternatives = phrases
        .iter()
        .map(|phrase| normalize(phrase))
        .filter(|phrase| !phrase.is_empty())
        .map(|phrase| regex::escape(&phrase).replace('\'', "['\u{2019}]?").replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    format!(r"(^|[.?!,])\s*(?:{alternatives})\s*[.?!]*\s*$")
}
