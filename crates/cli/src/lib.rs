pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "sitespend",
    about = "Sitespend operator CLI",
    long_about = "Operate the site spending record store: migrations, demo data, readiness checks, config inspection and reports.",
    after_help = "Examples:\n  sitespend doctor --json\n  sitespend seed\n  sitespend report daily-spending --date 2026-03-02"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo sites and reviewer accounts (idempotent)")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "Read-only spending reports")]
    Report(ReportCommand),
}

#[derive(Debug, Subcommand)]
enum ReportCommand {
    #[command(about = "Approved spending for one day in the configured reporting time zone")]
    DailySpending {
        #[arg(long, value_name = "YYYY-MM-DD", help = "Business day; defaults to today")]
        date: Option<String>,
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
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Report(ReportCommand::DailySpending { date }) => {
            commands::report::daily_spending(date.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
