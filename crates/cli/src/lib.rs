pub mod commands;
pub mod logging;

use clap::{ArgGroup, Parser, Subcommand};
use std::process::ExitCode;

use callsync_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "callsync",
    about = "CRM call sync operator CLI",
    long_about = "Ingest call records from the CRM into the local store, fetch call audio, and inspect runtime readiness.",
    after_help = "Examples:\n  callsync sync-day --tenant clinic-1 --date 05.04.2025\n  callsync sync-range --all-tenants --start 2025-04-01 --end 2025-04-07\n  callsync fetch-audio --tenant clinic-1 --date 2025-04-05\n  callsync doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity, tenant credentials and the audio proxy")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Ingest one day of calls for a tenant")]
    SyncDay {
        #[arg(long, help = "Tenant id as configured")]
        tenant: String,
        #[arg(long, help = "Day to sync (DD.MM.YYYY, YYYY-MM-DD, YYYY.MM.DD or DD-MM-YYYY)")]
        date: String,
        #[arg(long, help = "Re-run the day even if it is already marked complete")]
        force: bool,
    },
    #[command(about = "Ingest an inclusive range of days for one tenant or every tenant")]
    #[command(group(ArgGroup::new("target").required(true).args(["tenant", "all_tenants"])))]
    SyncRange {
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, help = "Run the range for every configured tenant")]
        all_tenants: bool,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, help = "Re-run days even if they are already marked complete")]
        force: bool,
    },
    #[command(about = "Download call audio for one record or for a tenant's pending day")]
    #[command(group(ArgGroup::new("selector").required(true).args(["note", "tenant"])))]
    FetchAudio {
        #[arg(long, help = "Dedupe key of a single call record")]
        note: Option<String>,
        #[arg(long, requires = "date")]
        tenant: Option<String>,
        #[arg(long, requires = "tenant")]
        date: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        logging::init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::SyncDay { tenant, date, force } => commands::sync::run_day(&tenant, &date, force),
        Command::SyncRange { tenant, all_tenants: _, start, end, force } => {
            commands::sync::run_range(tenant.as_deref(), &start, &end, force)
        }
        Command::FetchAudio { note, tenant, date } => match (note, tenant, date) {
            (Some(note), _, _) => commands::audio::run_for_key(&note),
            (None, Some(tenant), Some(date)) => commands::audio::run_for_day(&tenant, &date),
            _ => commands::CommandResult::failure(
                "fetch-audio",
                "invalid_input",
                "either --note or --tenant with --date is required",
                3,
            ),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
