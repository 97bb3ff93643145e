//! Objection caps and the acceptance policy.
//!
//! `decide` is a pure function of the scenario, the rebuilt memory and the rep's latest
//! line. It never talks to the generator, so it can be exercised without a network.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{classify, Topic};
use crate::domain::{Difficulty, Scenario};
use crate::memory::Memory;
use crate::rules::RuleBook;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectionCaps {
    pub min_cap: u32,
    pub max_cap: u32,
    /// Objection count at which a close attempt must be honored.
    pub accept_at: u32,
}

impl ObjectionCaps {
    pub const fn new(min_cap: u32, max_cap: u32, accept_at: u32) -> Self {
        Self { min_cap, max_cap, accept_at }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapTableError {
    #[error("{difficulty}: min_cap {min_cap} exceeds max_cap {max_cap}")]
    InvertedInterval { difficulty: Difficulty, min_cap: u32, max_cap: u32 },
    #[error("{difficulty}: accept_at {accept_at} exceeds max_cap {max_cap}")]
    AcceptBeyondCap { difficulty: Difficulty, accept_at: u32, max_cap: u32 },
    #[error("{field} must not decrease from {easier} to {harder}")]
    NotMonotonic { field: &'static str, easier: Difficulty, harder: Difficulty },
}

/// Per-difficulty caps. Harder buyers tolerate at least as many objections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapTable {
    easy: ObjectionCaps,
    medium: ObjectionCaps,
    hard: ObjectionCaps,
}

impl Default for CapTable {
    fn default() -> Self {
        Self {
            easy: ObjectionCaps::new(1, 2, 1),
            medium: ObjectionCaps::new(2, 3, 3),
            hard: ObjectionCaps::new(3, 4, 4),
        }
    }
}

impl CapTable {
    pub fn new(
        easy: ObjectionCaps,
        medium: ObjectionCaps,
        hard: ObjectionCaps,
    ) -> Result<Self, CapTableError> {
        let table = Self { easy, medium, hard };
        table.validate()?;
        Ok(table)
    }

    pub fn caps(&self, difficulty: Difficulty) -> ObjectionCaps {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn min_cap(&self, difficulty: Difficulty) -> u32 {
        self.caps(difficulty).min_cap
    }

    pub fn max_cap(&self, difficulty: Difficulty) -> u32 {
        self.caps(difficulty).max_cap
    }

    pub fn accept_at(&self, difficulty: Difficulty) -> u32 {
        self.caps(difficulty).accept_at
    }

    fn validate(&self) -> Result<(), CapTableError> {
        for difficulty in Difficulty::ALL {
            let caps = self.caps(difficulty);
            if caps.min_cap > caps.max_cap {
                return Err(CapTableError::InvertedInterval {
                    difficulty,
                    min_cap: caps.min_cap,
                    max_cap: caps.max_cap,
                });
            }
            if caps.accept_at > caps.max_cap {
                return Err(CapTableError::AcceptBeyondCap {
                    difficulty,
                    accept_at: caps.accept_at,
                    max_cap: caps.max_cap,
                });
            }
        }

        for pair in Difficulty::ALL.windows(2) {
            let (easier, harder) = (pair[0], pair[1]);
            if self.min_cap(easier) > self.min_cap(harder) {
                return Err(CapTableError::NotMonotonic { field: "min_cap", easier, harder });
            }
            if self.max_cap(easier) > self.max_cap(harder) {
                return Err(CapTableError::NotMonotonic { field: "max_cap", easier, harder });
            }
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "topic", rename_all = "snake_case")]
pub enum PivotScope {
    /// The objection cap is spent; no further objection of any kind.
    AllObjections,
    /// The buyer already raised this topic twice.
    Topic(Topic),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "pivot", rename_all = "snake_case")]
pub enum PolicyDecision {
    Continue,
    PivotTopic(PivotScope),
    ForceAccept,
}

pub fn decide(
    rules: &RuleBook,
    caps: &CapTable,
    scenario: &Scenario,
    memory: &Memory,
    last_rep_line: Option<&str>,
) -> PolicyDecision {
    let caps = caps.caps(scenario.difficulty);
    let is_close_attempt =
        last_rep_line.map(|line| classify(rules, line).is_close_attempt).unwrap_or(false);

    if is_close_attempt && memory.total_objections >= caps.accept_at {
        return PolicyDecision::ForceAccept;
    }

    if memory.total_objections >= caps.max_cap {
        return PolicyDecision::PivotTopic(PivotScope::AllObjections);
    }

    let repeated_topic = rules
        .topic_rules()
        .iter()
        .map(|rule| rule.topic())
        .find(|topic| memory.topic_count(*topic) >= 2);
    if let Some(topic) = repeated_topic {
        return PolicyDecision::PivotTopic(PivotScope::Topic(topic));
    }

    PolicyDecision::Continue
}
