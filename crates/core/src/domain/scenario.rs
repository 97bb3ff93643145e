//! Per-conversation scenario configuration.
//!
//! A scenario is created by the caller once per conversation and never mutated by the
//! engine. Deserialization is deliberately forgiving: unknown or malformed values fall
//! back to neutral defaults instead of rejecting the request.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::lenient;

/// Industry vertical the simulated buyer belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Vertical {
    /// Prescriber conversations. The only vertical where coverage language is allowed.
    Pharma,
    #[default]
    B2b,
    DoorToDoor,
    Tech,
}

impl Vertical {
    pub const ALL: [Vertical; 4] = [Self::Pharma, Self::B2b, Self::DoorToDoor, Self::Tech];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pharma => "pharma",
            Self::B2b => "b2b",
            Self::DoorToDoor => "door2door",
            Self::Tech => "tech",
        }
    }

    /// Whether coverage / prior-authorization talk belongs in this vertical at all.
    pub fn permits_restricted_topic(&self) -> bool {
        matches!(self, Self::Pharma)
    }
}

impl From<String> for Vertical {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pharma" | "pharmaceutical" => Self::Pharma,
            "door2door" | "door_to_door" | "door-to-door" => Self::DoorToDoor,
            "tech" | "technology" | "saas" => Self::Tech,
            _ => Self::B2b,
        }
    }
}

impl From<Vertical> for String {
    fn from(value: Vertical) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Vertical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from most to least forgiving buyer.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Self::Easy, Self::Medium, Self::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl From<String> for Difficulty {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Medium,
        }
    }
}

impl From<Difficulty> for String {
    fn from(value: Difficulty) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    #[serde(deserialize_with = "lenient")]
    pub vertical: Vertical,
    #[serde(deserialize_with = "lenient")]
    pub difficulty: Difficulty,
    /// Free-text style descriptor handed to the generator verbatim.
    #[serde(deserialize_with = "lenient")]
    pub tone: String,
    #[serde(deserialize_with = "lenient")]
    pub product: String,
    #[serde(deserialize_with = "lenient")]
    pub persona: String,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            vertical: Vertical::default(),
            difficulty: Difficulty::default(),
            tone: "natural".to_string(),
            product: String::new(),
            persona: String::new(),
        }
    }
}

impl Scenario {
    pub fn new(vertical: Vertical, difficulty: Difficulty) -> Self {
        Self { vertical, difficulty, ..Self::default() }
    }

    pub fn effective_tone(&self) -> &str {
        let tone = self.tone.trim();
        if tone.is_empty() {
            "natural"
        } else {
            tone
        }
    }
}
