use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::Context;
use pitchsim_agent::lines::RESTATE_LINE;
use pitchsim_agent::runtime::{BuyerRequest, BuyerRuntime};
use pitchsim_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use crate::commands::{exit, CommandResult};

#[derive(Debug, Serialize)]
struct ReplyPayload<'a> {
    text: &'a str,
}

pub fn run(file: Option<&Path>, explain: bool) -> CommandResult {
    let body = match read_body(file) {
        Ok(body) => body,
        Err(error) => {
            return CommandResult::failure("reply", "input", format!("{error:#}"), exit::INPUT)
        }
    };
    run_with_body(&body, explain)
}

/// Runs the engine once over an already-read request body.
pub fn run_with_body(body: &[u8], explain: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "reply",
                "config_validation",
                error.to_string(),
                exit::CONFIG,
            )
        }
    };

    let runtime = match BuyerRuntime::from_config(&config) {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "reply",
                error.error_class(),
                error.to_string(),
                exit::RULE_BOOK,
            )
        }
    };

    let Some(request) = BuyerRequest::from_json(body) else {
        return CommandResult::json("reply", &ReplyPayload { text: RESTATE_LINE });
    };

    let executor = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(executor) => executor,
        Err(error) => {
            return CommandResult::failure(
                "reply",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                exit::RUNTIME,
            )
        }
    };

    let reply = executor.block_on(runtime.reply(&request, "cli"));
    if explain {
        CommandResult::json("reply", &reply)
    } else {
        CommandResult::json("reply", &ReplyPayload { text: &reply.text })
    }
}

fn read_body(file: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match file {
        Some(path) => fs::read(path)
            .with_context(|| format!("could not read request file `{}`", path.display())),
        None => {
            let mut body = Vec::new();
            io::stdin().read_to_end(&mut body).context("could not read request from stdin")?;
            Ok(body)
        }
    }
}
