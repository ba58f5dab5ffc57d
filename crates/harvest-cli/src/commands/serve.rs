//! Serve command implementation.
//!
//! Runs the orchestrator loop and recovery sweeps against the local state
//! store until interrupted.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;

use harvest_adapter_http::{HttpWorkflowConfig, HttpWorkflowService};
use harvest_sched::{Orchestrator, OrchestratorConfig};

use super::common::{load_config, open_store, state_dir};

/// Command-line settings layered over the config file.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub check_interval: Option<u64>,
    pub max_collections: Option<usize>,
    pub max_weeks: Option<usize>,
}

impl Overrides {
    fn apply(self, config: &mut OrchestratorConfig) {
        if let Some(secs) = self.check_interval {
            config.check_interval_secs = secs;
        }
        if let Some(max) = self.max_collections {
            config.max_concurrent_collections = max;
        }
        if let Some(max) = self.max_weeks {
            config.max_concurrent_weeks = max;
        }
    }
}

/// Execute the serve command.
pub async fn execute(
    explicit_state_dir: Option<&Path>,
    workflow_url: &str,
    config_path: Option<&Path>,
    overrides: Overrides,
    poll_interval: u64,
) -> Result<()> {
    let dir = state_dir(explicit_state_dir)?;
    let mut config = load_config(config_path, &dir)?;
    overrides.apply(&mut config);

    let store = open_store(Some(&dir))?;
    let workflow = HttpWorkflowService::new(
        HttpWorkflowConfig::new(workflow_url)
            .with_poll_interval(Duration::from_secs(poll_interval)),
    )
    .context("Failed to create workflow client")?;

    let orchestrator = Arc::new(
        Orchestrator::new(config, store, Arc::new(workflow))
            .context("Invalid orchestrator configuration")?,
    );

    let config = orchestrator.config();
    println!(
        "{} Harvest orchestrator running against {}",
        style("→").cyan().bold(),
        style(workflow_url).green()
    );
    println!(
        "  State: {}  Poll: {}s  Collections: {}  Weeks: {}",
        style(dir.display()).dim(),
        config.check_interval_secs,
        config.max_concurrent_collections,
        config.max_concurrent_weeks,
    );
    println!("  Press Ctrl-C to stop.");

    orchestrator.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!(
        "{} Stopping; waiting for {} in-flight collection(s)...",
        style("→").cyan().bold(),
        orchestrator.claims().local_claims()
    );
    orchestrator.stop().await;
    println!("{} Stopped", style("✓").green().bold());

    Ok(())
}
