use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use trigger_history::config::{Config, LoggingConfig};
use trigger_history::history::{JobKey, TriggerHistory, TriggerKey};
use trigger_history::storage::{self, range_or_all};
use trigger_history::store::{SqliteTriggerHistoryStore, TriggerHistoryStore};

#[derive(Parser)]
#[command(
    name = "trigger-history",
    about = "Durable execution history for job scheduler triggers",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the history API (reporting + event ingestion)
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Query recorded trigger history
    History {
        /// JSON output for machine parsing
        #[arg(long, global = true)]
        json: bool,

        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List history by job, trigger, or time range
    List {
        /// Job key as 'group.name' (or 'name' for the default group)
        #[arg(long, conflicts_with = "trigger")]
        job: Option<JobKey>,

        /// Trigger key as 'group.name' (or 'name' for the default group)
        #[arg(long)]
        trigger: Option<TriggerKey>,

        /// Range start (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Range end, exclusive (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// Filter the range on end time instead of start time
        #[arg(long)]
        by_end: bool,

        /// Maximum records to return
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show one record by id
    Show {
        id: Uuid,
    },

    /// Show the record for a fire instance
    Fire {
        fire_instance_id: String,
    },

    /// List executions that have not completed
    InFlight {
        /// Maximum records to return
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Config resolution runs before the configured subscriber exists, so its
/// fallback warnings go to a scoped stderr subscriber instead.
fn resolve_config(explicit: Option<&std::path::Path>) -> Result<Config> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::with_default(bootstrap, || Config::resolve(explicit))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = resolve_config(cli.config.as_deref())?;

    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.api.bind = bind;
            }
            tracing::info!(bind = %config.api.bind, "Starting trigger-history service");
            trigger_history::serve(&config).await?;
        }
        Commands::History { json, action } => {
            let pool = storage::open_pool(&config.storage)?;
            let conn = pool.get().context("failed to get database connection")?;
            let store = SqliteTriggerHistoryStore::new();

            let records = match action {
                HistoryAction::List {
                    job,
                    trigger,
                    from,
                    to,
                    by_end,
                    limit,
                } => {
                    if let Some(job) = job {
                        store.find_by_job_key(&conn, &job, limit)?
                    } else if let Some(trigger) = trigger {
                        store.find_by_trigger_key(&conn, &trigger, limit)?
                    } else {
                        let (from, to) = range_or_all(from, to);
                        if by_end {
                            store.find_by_end_time_range(&conn, from, to, limit)?
                        } else {
                            store.find_by_start_time_range(&conn, from, to, limit)?
                        }
                    }
                }
                HistoryAction::Show { id } => {
                    let record = store
                        .find_by_id(&conn, &id)?
                        .with_context(|| format!("no history record with id {}", id))?;
                    vec![record]
                }
                HistoryAction::Fire { fire_instance_id } => {
                    let record = store
                        .find_by_fire_instance_id(&conn, &fire_instance_id)?
                        .with_context(|| {
                            format!("no history record for fire instance '{}'", fire_instance_id)
                        })?;
                    vec![record]
                }
                HistoryAction::InFlight { limit } => store.find_in_flight(&conn, limit)?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_table(&records);
            }
        }
    }

    Ok(())
}

fn print_table(records: &[TriggerHistory]) {
    if records.is_empty() {
        println!("No history found.");
        return;
    }

    println!(
        "{:<24} | {:<24} | {:<24} | {:<20} | {:<20} | Duration",
        "Fire Instance", "Job", "Trigger", "Start", "End"
    );
    println!(
        "{:-<24}-|-{:-<24}-|-{:-<24}-|-{:-<20}-|-{:-<20}-|-{:-<10}",
        "", "", "", "", "", ""
    );
    for h in records {
        let end = h
            .end_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "in flight".to_string());
        let duration = h
            .duration()
            .map(|d| format!("{:.3}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} | {:<24} | {:<24} | {:<20} | {:<20} | {}",
            h.fire_instance_id,
            h.job_key.to_string(),
            h.trigger_key.to_string(),
            h.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            end,
            duration
        );
    }
}
