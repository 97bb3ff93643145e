use std::env;
use std::fs;
use std::path::Path;

use pitchsim_core::config::{detect_config_path, AppConfig, LoadOptions};
use pitchsim_core::domain::Difficulty;
use pitchsim_core::policy::ObjectionCaps;
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", &["PITCHSIM_LLM_PROVIDER"]),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", &["PITCHSIM_LLM_MODEL"]),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.endpoint_base(),
        source("llm.base_url", &["PITCHSIM_LLM_BASE_URL"]),
    ));

    let llm_api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(render_line(
        "llm.api_key",
        &llm_api_key,
        source("llm.api_key", &["PITCHSIM_LLM_API_KEY", "OPENAI_API_KEY", "ANTHROPIC_API_KEY"]),
    ));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", &["PITCHSIM_LLM_TIMEOUT_SECS"]),
    ));
    lines.push(render_line(
        "llm.max_retries",
        &config.llm.max_retries.to_string(),
        source("llm.max_retries", &["PITCHSIM_LLM_MAX_RETRIES"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["PITCHSIM_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["PITCHSIM_SERVER_PORT"]),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", &["PITCHSIM_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ));

    let rules_path = config
        .engine
        .rules_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<built-in>".to_string());
    lines.push(render_line(
        "engine.rules_path",
        &rules_path,
        source("engine.rules_path", &["PITCHSIM_ENGINE_RULES_PATH"]),
    ));
    lines.push(render_line(
        "engine.history_window",
        &config.engine.history_window.to_string(),
        source("engine.history_window", &["PITCHSIM_ENGINE_HISTORY_WINDOW"]),
    ));
    lines.push(render_line(
        "engine.acceptance_window",
        &config.engine.acceptance_window.to_string(),
        source("engine.acceptance_window", &["PITCHSIM_ENGINE_ACCEPTANCE_WINDOW"]),
    ));

    lines.push(render_line(
        "session.ttl_secs",
        &config.session.ttl_secs.to_string(),
        source("session.ttl_secs", &["PITCHSIM_SESSION_TTL_SECS"]),
    ));
    lines.push(render_line(
        "session.sweep_interval_secs",
        &config.session.sweep_interval_secs.to_string(),
        source("session.sweep_interval_secs", &["PITCHSIM_SESSION_SWEEP_INTERVAL_SECS"]),
    ));

    for difficulty in Difficulty::ALL {
        let caps = match difficulty {
            Difficulty::Easy => config.caps.easy,
            Difficulty::Medium => config.caps.medium,
            Difficulty::Hard => config.caps.hard,
        };
        let key_path = format!("caps.{}", difficulty.as_str());
        lines.push(render_line(&key_path, &render_caps(caps), source(&key_path, &[])));
    }

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["PITCHSIM_LOGGING_LEVEL", "PITCHSIM_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["PITCHSIM_LOGGING_FORMAT", "PITCHSIM_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|env_key| env::var_os(env_key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_caps(caps: ObjectionCaps) -> String {
    format!("min {} / max {} / accept at {}", caps.min_cap, caps.max_cap, caps.accept_at)
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::redact_token;

    #[test]
    fn redact_token_keeps_only_the_vendor_prefix() {
        assert_eq!(redact_token("sk-ant-abc123"), "sk-***");
        assert_eq!(redact_token("plainsecret"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }
}
