pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use signoff_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use signoff_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "signoff",
    about = "Signoff operator CLI",
    long_about = "Operate the signoff approval engine: migrations, demo seeds, policy and \
                  chain inspection, and manual step resolution.",
    after_help = "Examples:\n  signoff migrate\n  signoff seed\n  signoff chain leave_request lr-1001\n  signoff approve leave_request lr-1001 --approver mem-morgan --requester mem-eli"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo tenant (members and policies)")]
    Seed,
    #[command(about = "List active approval policies for a tenant and request kind")]
    Policies {
        #[arg(long, default_value = "acme")]
        tenant: String,
        #[arg(help = "leave_request | purchase_request | asset_request")]
        kind: String,
    },
    #[command(about = "Show which policy would govern a request with the given threshold")]
    Applicable {
        #[arg(long, default_value = "acme")]
        tenant: String,
        kind: String,
        #[arg(long, help = "Day count for leave requests, e.g. 2.5")]
        days: Option<String>,
        #[arg(long, help = "Amount for purchase/asset requests, e.g. 4999.99")]
        amount: Option<String>,
    },
    #[command(about = "Show the approval chain for one request")]
    Chain { kind: String, id: String },
    #[command(about = "Show the chain summary (status, progress, current step)")]
    Summary { kind: String, id: String },
    #[command(about = "Approve the request's current pending step")]
    Approve {
        kind: String,
        id: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        requester: String,
        #[arg(long)]
        notes: Option<String>,
    },
    #[command(about = "Reject the request's current pending step (skips the rest of the chain)")]
    Reject {
        kind: String,
        id: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        requester: String,
        #[arg(long)]
        notes: Option<String>,
    },
    #[command(about = "Force-approve every pending step as an admin")]
    Bypass {
        kind: String,
        id: String,
        #[arg(long)]
        admin: String,
        #[arg(long)]
        note: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Engine tracing is useful even from one-shot commands; config problems
    // are reported by the command itself, so a failed load only skips logging.
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Policies { tenant, kind } => commands::policy::list(&tenant, &kind),
        Command::Applicable { tenant, kind, days, amount } => {
            commands::policy::applicable(&tenant, &kind, days.as_deref(), amount.as_deref())
        }
        Command::Chain { kind, id } => commands::chain::show(&kind, &id),
        Command::Summary { kind, id } => commands::chain::summary(&kind, &id),
        Command::Approve { kind, id, approver, requester, notes } => {
            commands::decide::run(&kind, &id, &approver, &requester, false, notes)
        }
        Command::Reject { kind, id, approver, requester, notes } => {
            commands::decide::run(&kind, &id, &approver, &requester, true, notes)
        }
        Command::Bypass { kind, id, admin, note } => {
            commands::bypass::run(&kind, &id, &admin, note)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
