//! Harvest Command-Line Interface
//!
//! The main entry point for the `harvest` tool: run the orchestrator, start
//! backfills, and inspect or control collections in the local state store.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{backfill, control, list, serve, status};

/// Harvest - historical analytics data collection
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// State directory holding harvest.db (default: ~/.harvest)
    #[arg(long, env = "HARVEST_STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the orchestrator and recovery sweeps until Ctrl-C
    Serve {
        /// Base URL of the workflow-execution service
        #[arg(long, env = "HARVEST_WORKFLOW_URL")]
        workflow_url: String,

        /// Orchestrator config file (YAML); defaults to <state-dir>/config.yaml if present
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconds between orchestrator polls
        #[arg(long)]
        check_interval: Option<u64>,

        /// Maximum concurrently running collections
        #[arg(long)]
        max_collections: Option<usize>,

        /// Maximum concurrently executing weeks
        #[arg(long)]
        max_weeks: Option<usize>,

        /// Seconds between execution status polls
        #[arg(long, default_value = "5")]
        poll_interval: u64,
    },

    /// Start a historical backfill for a workflow
    Backfill {
        /// Workflow to execute for each week
        #[arg(short, long)]
        workflow: String,

        /// Instance the workflow runs against
        #[arg(short, long)]
        instance: String,

        /// Owning user
        #[arg(short, long)]
        user: String,

        /// Number of weeks to collect (1-52)
        #[arg(long)]
        weeks: Option<u32>,

        /// Last day to collect (YYYY-MM-DD, default: yesterday)
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// Create a one-week weekly update instead of a backfill
        #[arg(long)]
        weekly: bool,

        /// Workflow parameters as a JSON object; may use {{start_date}} and friends
        #[arg(long)]
        params: Option<String>,
    },

    /// Pause a collection after its current week
    Pause {
        /// Collection id (hc_... or UUID)
        id: String,
    },

    /// Resume a paused collection
    Resume {
        /// Collection id (hc_... or UUID)
        id: String,
    },

    /// Cancel a collection
    Cancel {
        /// Collection id (hc_... or UUID)
        id: String,
    },

    /// Re-queue a failed collection with a fresh retry budget
    Reset {
        /// Collection id (hc_... or UUID)
        id: String,
    },

    /// Show the progress of a collection
    Status {
        /// Collection id (hc_... or UUID)
        id: String,

        /// Show every week
        #[arg(long)]
        weeks: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List collections
    List {
        /// Only this user's collections
        #[arg(long)]
        user: Option<String>,

        /// Only collections in this status
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of collections
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let state_dir = cli.state_dir.as_deref();

    // Execute command
    let result = match cli.command {
        Commands::Serve {
            workflow_url,
            config,
            check_interval,
            max_collections,
            max_weeks,
            poll_interval,
        } => {
            serve::execute(
                state_dir,
                &workflow_url,
                config.as_deref(),
                serve::Overrides {
                    check_interval,
                    max_collections,
                    max_weeks,
                },
                poll_interval,
            )
            .await
        }

        Commands::Backfill {
            workflow,
            instance,
            user,
            weeks,
            end_date,
            weekly,
            params,
        } => {
            backfill::execute(
                state_dir,
                &workflow,
                &instance,
                &user,
                weeks,
                end_date,
                weekly,
                params.as_deref(),
            )
            .await
        }

        Commands::Pause { id } => control::execute(state_dir, control::Action::Pause, &id).await,
        Commands::Resume { id } => control::execute(state_dir, control::Action::Resume, &id).await,
        Commands::Cancel { id } => control::execute(state_dir, control::Action::Cancel, &id).await,
        Commands::Reset { id } => control::execute(state_dir, control::Action::Reset, &id).await,

        Commands::Status { id, weeks, json } => status::execute(state_dir, &id, weeks, json).await,

        Commands::List {
            user,
            status,
            limit,
        } => list::execute(state_dir, user.as_deref(), status.as_deref(), limit).await,
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_backfill() {
        let cli = parse(&[
            "harvest",
            "backfill",
            "-w",
            "wf-1",
            "-i",
            "inst-1",
            "-u",
            "user-1",
            "--weeks",
            "12",
            "--end-date",
            "2024-06-30",
        ]);
        match cli.command {
            Commands::Backfill {
                workflow,
                weeks,
                end_date,
                weekly,
                ..
            } => {
                assert_eq!(workflow, "wf-1");
                assert_eq!(weeks, Some(12));
                assert_eq!(end_date, NaiveDate::from_ymd_opt(2024, 6, 30));
                assert!(!weekly);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        let result = Cli::try_parse_from([
            "harvest", "backfill", "-w", "wf", "-i", "inst", "-u", "u", "--end-date", "June",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_verbosity_and_state_dir() {
        let cli = parse(&["harvest", "-vv", "--state-dir", "/tmp/h", "status", "hc_0123456789ab"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/h")));
        assert!(matches!(cli.command, Commands::Status { weeks: false, json: false, .. }));
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = parse(&[
            "harvest",
            "serve",
            "--workflow-url",
            "https://workflows.example.com",
            "--max-weeks",
            "4",
        ]);
        match cli.command {
            Commands::Serve {
                max_weeks,
                max_collections,
                poll_interval,
                ..
            } => {
                assert_eq!(max_weeks, Some(4));
                assert_eq!(max_collections, None);
                assert_eq!(poll_interval, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_control_commands_need_id() {
        assert!(Cli::try_parse_from(["harvest", "pause"]).is_err());
        assert!(matches!(
            parse(&["harvest", "cancel", "hc_0123456789ab"]).command,
            Commands::Cancel { id } if id == "hc_0123456789ab"
        ));
    }
}
