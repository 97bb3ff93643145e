pub mod classify;
pub mod config;
pub mod doctor;
pub mod reply;
pub mod smoke;

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Successful result whose output is `value` itself rather than a status envelope.
    pub fn json<T: Serialize>(command: &str, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(output) => Self { exit_code: 0, output },
            Err(error) => Self::failure(command, "serialization", error.to_string(), exit::RUNTIME),
        }
    }
}

/// Exit codes shared by every command.
pub mod exit {
    pub const CONFIG: u8 = 2;
    pub const RULE_BOOK: u8 = 3;
    pub const INPUT: u8 = 4;
    pub const RUNTIME: u8 = 5;
    pub const SMOKE: u8 = 6;
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
