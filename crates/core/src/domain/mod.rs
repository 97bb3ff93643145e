pub mod conversation;
pub mod scenario;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

pub use conversation::{Conversation, Speaker, Turn};
pub use scenario::{Difficulty, Scenario, Vertical};

/// Accepts `null`, wrong JSON types, and unknown strings by falling back to `T::default()`.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}
