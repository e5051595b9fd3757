mod config_commands;
mod jobs;
mod run_commands;
mod schedule_commands;

use std::path::PathBuf;

use {
    chrono::{DateTime, Utc},
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "cadence", about = "Cadence, cron-scheduled batch ingestion runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./cadence.toml and friends).
    #[arg(long, global = true, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule the jobs in a job list and run until interrupted.
    Run {
        /// Job list (TOML, YAML or JSON).
        #[arg(long, env = "CADENCE_JOBS")]
        jobs: PathBuf,
    },
    /// Print upcoming fire times of a cron expression.
    Next {
        /// Five-field cron expression, e.g. "*/15 * * * *".
        expr: String,
        /// How many fire times to print.
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
        /// Start from this instant (RFC 3339) instead of now.
        #[arg(long)]
        after: Option<DateTime<Utc>>,
    },
    /// Validate the config file and optionally a job list.
    Check {
        #[arg(long)]
        jobs: Option<PathBuf>,
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "cadence starting");

    match cli.command {
        Commands::Run { ref jobs } => {
            let config = match cli.config {
                Some(ref path) => cadence_config::load_config(path)?,
                None => cadence_config::discover_and_load(),
            };
            let diagnostics = cadence_config::validate_config(&config);
            if diagnostics.has_errors() {
                for d in &diagnostics.diagnostics {
                    eprintln!("{d}");
                }
                anyhow::bail!("invalid configuration");
            }
            run_commands::run(config, jobs).await
        },
        Commands::Next {
            ref expr,
            count,
            after,
        } => schedule_commands::next(expr, count, after),
        Commands::Check { ref jobs, verbose } => {
            config_commands::check(cli.config.as_deref(), jobs.as_deref(), verbose)
        },
    }
}
