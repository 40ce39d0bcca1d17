pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "despesas",
    about = "Despesas operator CLI",
    long_about = "Operate the expense requisition store: migrations, demo directory, config inspection and notification delivery.",
    after_help = "Examples:\n  despesas migrate\n  despesas seed\n  despesas config\n  despesas drain-outbox --max-passes 5"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo user and department directory (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Deliver due notifications from the outbox once and exit")]
    DrainOutbox {
        #[arg(long, default_value_t = 1, help = "Maximum number of batches to deliver")]
        max_passes: u32,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::DrainOutbox { max_passes } => commands::drain_outbox::run(max_passes),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
