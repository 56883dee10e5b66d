pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "hostline",
    about = "Hostline operator CLI",
    long_about = "Operate the Hostline voice agent: preflight, migrations, demo data, config inspection, smoke validation and text chat with the agent.",
    after_help = "Examples:\n  hostline doctor --json\n  hostline seed\n  hostline chat --message \"What's on the menu?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the restaurant demo dataset and verify it (idempotent)")]
    Seed,
    #[command(about = "Run an in-memory call through the agent with per-check timing details")]
    Smoke,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database, LLM mode, telephony and speech backends")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Send caller utterances to the agent against the configured database")]
    Chat {
        #[arg(long = "message", short = 'm', required = true, help = "Caller utterance; repeat for several turns")]
        messages: Vec<String>,
        #[arg(long, default_value = commands::chat::DEFAULT_CALL_SID, help = "Call SID recorded for the session")]
        call_sid: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Smoke => commands::smoke::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Chat { messages, call_sid } => commands::chat::run(&messages, &call_sid),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
