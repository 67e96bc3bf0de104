use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cadence_core::Config;

mod commands;

#[derive(Parser)]
#[command(name = "cadence", version, about = "Cadence habit tracker CLI")]
struct Cli {
    /// Evaluate as if today were this date (YYYY-MM-DD)
    #[arg(long, global = true, value_parser = commands::common::parse_date_arg)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task and habit management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Missed-occurrence detection
    Detect {
        #[command(subcommand)]
        action: commands::detect::DetectAction,
    },
    /// Missed-occurrence ledger queries
    Missed {
        #[command(subcommand)]
        action: commands::missed::MissedAction,
    },
    /// Habit and task analytics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Log to stderr; stdout carries JSON only.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("CADENCE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(Config::load_or_default().log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let now = commands::common::clock(cli.today);
    let result = match cli.command {
        Commands::Task { action } => commands::task::run(action, now),
        Commands::Detect { action } => commands::detect::run(action, now),
        Commands::Missed { action } => commands::missed::run(action),
        Commands::Stats { action } => commands::stats::run(action, now),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
