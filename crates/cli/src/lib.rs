pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "pitchsim",
    about = "Pitchsim operator CLI",
    long_about = "Run the buyer engine once, inspect classification and configuration, and validate readiness.",
    after_help = "Examples:\n  pitchsim reply --file request.json\n  pitchsim classify \"the price is too high\"\n  pitchsim doctor --json\n  pitchsim smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Produce one buyer reply for a request read from a file or stdin")]
    Reply {
        #[arg(long, help = "Request JSON file; stdin is read when omitted")]
        file: Option<PathBuf>,
        #[arg(long, help = "Include decision, memory and guardrail trail in the output")]
        explain: bool,
    },
    #[command(about = "Classify one line of dialogue with the active rule book")]
    Classify {
        #[arg(help = "Line to classify")]
        text: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, rule book, objection caps and generator readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run the reference conversations offline with per-check timing details")]
    Smoke,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Reply { file, explain } => commands::reply::run(file.as_deref(), explain),
        Command::Classify { text } => commands::classify::run(&text),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Smoke => commands::smoke::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
