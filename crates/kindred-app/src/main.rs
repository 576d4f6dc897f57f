mod commands;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kindred")]
#[command(about = "Schedule moments, review your week and share a weekly update")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show this week's calendar events
    Week,
    /// Schedule a moment and add it to the calendar
    Schedule {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// When it happens (RFC 3339, e.g. "2024-06-01T10:00:00+01:00")
        #[arg(long, value_parser = parse_instant)]
        at: DateTime<Utc>,

        /// Keep the moment local only
        #[arg(long)]
        no_sync: bool,
    },
    /// Send the weekly update email
    Report {
        #[arg(long)]
        issues: String,

        #[arg(long)]
        wellbeing: String,
    },
    /// Validate configuration without touching the network
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    kindred_core::init()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Week => commands::week::run().await,
        Commands::Schedule {
            title,
            description,
            at,
            no_sync,
        } => commands::schedule::run(title, description, at, !no_sync).await,
        Commands::Report { issues, wellbeing } => commands::report::run(issues, wellbeing).await,
        Commands::CheckConfig => commands::config::run(),
    }
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}
