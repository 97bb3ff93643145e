use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Difficulty;
use crate::policy::{CapTable, CapTableError, ObjectionCaps};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub session: SessionConfig,
    pub caps: CapsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Replacement rule book; the built-in rules are used when unset.
    pub rules_path: Option<PathBuf>,
    /// Turns of recent dialogue handed to the generator for a buyer line.
    pub history_window: usize,
    /// Turns of recent dialogue handed to the generator for an acceptance line.
    pub acceptance_window: usize,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapsConfig {
    pub easy: ObjectionCaps,
    pub medium: ObjectionCaps,
    pub hard: ObjectionCaps,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub rules_path: Option<PathBuf>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let caps = CapTable::default();
        Self {
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 20,
                max_retries: 1,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            engine: EngineConfig { rules_path: None, history_window: 14, acceptance_window: 10 },
            session: SessionConfig { ttl_secs: 3600, sweep_interval_secs: 300 },
            caps: CapsConfig {
                easy: caps.caps(Difficulty::Easy),
                medium: caps.caps(Difficulty::Medium),
                hard: caps.caps(Difficulty::Hard),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Anthropic)
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

impl LlmConfig {
    pub fn endpoint_base(&self) -> &str {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    /// `false` means the engine runs on deterministic fallback lines only.
    pub fn has_credentials(&self) -> bool {
        if !self.provider.requires_api_key() {
            return true;
        }
        self.api_key.as_ref().map(|key| !key.expose_secret().trim().is_empty()).unwrap_or(false)
    }
}

impl CapsConfig {
    pub fn table(&self) -> Result<CapTable, CapTableError> {
        CapTable::new(self.easy, self.medium, self.hard)
    }

    fn caps_mut(&mut self, difficulty: Difficulty) -> &mut ObjectionCaps {
        match difficulty {
            Difficulty::Easy => &mut self.easy,
            Difficulty::Medium => &mut self.medium,
            Difficulty::Hard => &mut self.hard,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pitchsim.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(rules_path) = engine.rules_path {
                self.engine.rules_path = Some(rules_path);
            }
            if let Some(history_window) = engine.history_window {
                self.engine.history_window = history_window;
            }
            if let Some(acceptance_window) = engine.acceptance_window {
                self.engine.acceptance_window = acceptance_window;
            }
        }

        if let Some(session) = patch.session {
            if let Some(ttl_secs) = session.ttl_secs {
                self.session.ttl_secs = ttl_secs;
            }
            if let Some(sweep_interval_secs) = session.sweep_interval_secs {
                self.session.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(caps) = patch.caps {
            for (difficulty, caps_patch) in
                [(Difficulty::Easy, caps.easy), (Difficulty::Medium, caps.medium), (Difficulty::Hard, caps.hard)]
            {
                let Some(caps_patch) = caps_patch else {
                    continue;
                };
                let target = self.caps.caps_mut(difficulty);
                if let Some(min_cap) = caps_patch.min_cap {
                    target.min_cap = min_cap;
                }
                if let Some(max_cap) = caps_patch.max_cap {
                    target.max_cap = max_cap;
                }
                if let Some(accept_at) = caps_patch.accept_at {
                    target.accept_at = accept_at;
                }
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PITCHSIM_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("PITCHSIM_LLM_API_KEY").or_else(|| match self.llm.provider {
            LlmProvider::OpenAi => read_env("OPENAI_API_KEY"),
            LlmProvider::Anthropic => read_env("ANTHROPIC_API_KEY"),
            LlmProvider::Ollama => None,
        });
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PITCHSIM_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PITCHSIM_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PITCHSIM_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PITCHSIM_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PITCHSIM_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("PITCHSIM_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("PITCHSIM_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PITCHSIM_SERVER_PORT") {
            self.server.port = parse_u16("PITCHSIM_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PITCHSIM_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PITCHSIM_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("PITCHSIM_ENGINE_RULES_PATH") {
            self.engine.rules_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("PITCHSIM_ENGINE_HISTORY_WINDOW") {
            self.engine.history_window = parse_usize("PITCHSIM_ENGINE_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("PITCHSIM_ENGINE_ACCEPTANCE_WINDOW") {
            self.engine.acceptance_window =
                parse_usize("PITCHSIM_ENGINE_ACCEPTANCE_WINDOW", &value)?;
        }

        if let Some(value) = read_env("PITCHSIM_SESSION_TTL_SECS") {
            self.session.ttl_secs = parse_u64("PITCHSIM_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("PITCHSIM_SESSION_SWEEP_INTERVAL_SECS") {
            self.session.sweep_interval_secs =
                parse_u64("PITCHSIM_SESSION_SWEEP_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("PITCHSIM_LOGGING_LEVEL").or_else(|| read_env("PITCHSIM_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PITCHSIM_LOGGING_FORMAT").or_else(|| read_env("PITCHSIM_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(rules_path) = overrides.rules_path {
            self.engine.rules_path = Some(rules_path);
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_engine(&self.engine)?;
        validate_session(&self.session)?;
        validate_caps(&self.caps)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pitchsim.toml"), PathBuf::from("config/pitchsim.toml")]
        .into_iter()
        .find(|path| path.exists())
}

/// Path of the file `AppConfig::load` would read, if any.
pub fn detect_config_path() -> Option<PathBuf> {
    resolve_config_path(None)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.history_window == 0 || engine.acceptance_window == 0 {
        return Err(ConfigError::Validation(
            "engine.history_window and engine.acceptance_window must be greater than zero"
                .to_string(),
        ));
    }

    if let Some(path) = &engine.rules_path {
        if !path.exists() {
            return Err(ConfigError::Validation(format!(
                "engine.rules_path `{}` does not exist",
                path.display()
            )));
        }
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.ttl_secs == 0 || session.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "session.ttl_secs and session.sweep_interval_secs must be greater than zero"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_caps(caps: &CapsConfig) -> Result<(), ConfigError> {
    caps.table().map(|_| ()).map_err(|error| ConfigError::Validation(format!("caps: {error}")))
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    engine: Option<EnginePatch>,
    session: Option<SessionPatch>,
    caps: Option<CapsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    rules_path: Option<PathBuf>,
    history_window: Option<usize>,
    acceptance_window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CapsPatch {
    easy: Option<DifficultyCapsPatch>,
    medium: Option<DifficultyCapsPatch>,
    hard: Option<DifficultyCapsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DifficultyCapsPatch {
    min_cap: Option<u32>,
    max_cap: Option<u32>,
    accept_at: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
