use std::fmt;

use serde::{Deserialize, Serialize};

use super::lenient;

/// Who said a line. Parsing ignores case and accepts the legacy `you`/`doc` names;
/// anything else is rejected so the turn can be dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Speaker {
    Rep,
    Buyer,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rep => "rep",
            Self::Buyer => "buyer",
        }
    }

    pub fn transcript_label(&self) -> &'static str {
        match self {
            Self::Rep => "Rep",
            Self::Buyer => "Buyer",
        }
    }
}

impl TryFrom<String> for Speaker {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rep" | "you" | "user" => Ok(Self::Rep),
            "buyer" | "doc" | "assistant" => Ok(Self::Buyer),
            other => Err(format!("unknown speaker `{other}`")),
        }
    }
}

impl From<Speaker> for String {
    fn from(value: Speaker) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One utterance. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(alias = "who")]
    pub speaker: Speaker,
    #[serde(default, deserialize_with = "lenient")]
    pub text: String,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self { speaker, text: text.into() }
    }

    pub fn rep(text: impl Into<String>) -> Self {
        Self::new(Speaker::Rep, text)
    }

    pub fn buyer(text: impl Into<String>) -> Self {
        Self::new(Speaker::Buyer, text)
    }
}

/// The full dialogue as supplied by the caller, in conversation order.
///
/// The engine never keeps its own copy between requests; every decision is rebuilt from
/// the value passed in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn has_rep_turn(&self) -> bool {
        self.turns.iter().any(|turn| turn.speaker == Speaker::Rep)
    }

    pub fn lines_from(&self, speaker: Speaker) -> impl Iterator<Item = &str> {
        self.turns.iter().filter(move |turn| turn.speaker == speaker).map(|turn| turn.text.as_str())
    }

    pub fn last_from(&self, speaker: Speaker) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.speaker == speaker)
            .map(|turn| turn.text.as_str())
    }

    /// The trailing `window` turns (all of them when the conversation is shorter).
    pub fn recent(&self, window: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    /// Renders turns as `Rep: ...` / `Buyer: ...` lines for prompting.
    pub fn transcript(turns: &[Turn]) -> String {
        turns
            .iter()
            .map(|turn| format!("{}: {}", turn.speaker.transcript_label(), turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Vec<Turn>> for Conversation {
    fn from(turns: Vec<Turn>) -> Self {
        Self::new(turns)
    }
}

impl FromIterator<Turn> for Conversation {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
