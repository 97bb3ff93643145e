use pitchsim_core::classifier::{classify, Classification};
use pitchsim_core::config::{AppConfig, LoadOptions};
use pitchsim_core::rules::{normalize, RuleBook};
use serde::Serialize;

use crate::commands::{exit, CommandResult};

#[derive(Debug, Serialize)]
struct ClassifyPayload<'a> {
    text: &'a str,
    normalized: String,
    #[serde(flatten)]
    classification: Classification,
    role_leak: bool,
    restricted_resolution: bool,
}

pub fn run(text: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "classify",
                "config_validation",
                error.to_string(),
                exit::CONFIG,
            )
        }
    };

    match RuleBook::load_or_builtin(config.engine.rules_path.as_deref()) {
        Ok(rules) => CommandResult::json("classify", &classify_with(&rules, text)),
        Err(error) => {
            CommandResult::failure("classify", "rule_book", error.to_string(), exit::RULE_BOOK)
        }
    }
}

fn classify_with<'a>(rules: &RuleBook, text: &'a str) -> ClassifyPayload<'a> {
    let normalized = normalize(text);
    ClassifyPayload {
        text,
        classification: classify(rules, text),
        role_leak: rules.is_role_leak(&normalized),
        restricted_resolution: rules.is_restricted_resolution(&normalized),
        normalized,
    }
}

#[cfg(test)]
mod tests {
    use pitchsim_core::classifier::Topic;
    use pitchsim_core::rules::RuleBook;

    use super::classify_with;

    #[test]
    fn payload_carries_flags_alongside_classification() {
        let rules = RuleBook::builtin().expect("built-in rules");
        let payload = classify_with(&rules, "  The PRICE is too high!  ");

        assert_eq!(payload.classification.topic, Topic::Price);
        assert!(payload.classification.is_objection);
        assert!(!payload.role_leak);

        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(value["topic"], "price");
        assert_eq!(value["is_objection"], true);
        assert_eq!(value["text"], "  The PRICE is too high!  ");
    }
}
