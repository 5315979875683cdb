pub mod commands;
pub mod engine;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "signoff",
    about = "Signoff operator CLI",
    long_about = "Operate the approval workflow engine: scripted demos, readiness smoke checks, and config inspection.",
    after_help = "Examples:\n  signoff demo\n  signoff smoke\n  signoff config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Drive a scripted approval scenario (sequential, threshold, auto-approve, escalation) through a wired engine"
    )]
    Demo,
    #[command(about = "Run end-to-end readiness checks with per-check timing details")]
    Smoke,
    #[command(about = "Inspect effective engine configuration with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    tracing::debug!(event_name = "cli.dispatch", command = ?cli.command, "dispatching command");

    let result = match cli.command {
        Command::Demo => commands::demo::run(),
        Command::Smoke => commands::smoke::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
