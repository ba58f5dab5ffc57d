//! Shared helpers for CLI commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use console::{StyledObject, style};

use harvest_sched::{CollectionService, CollectionStatus, OrchestratorConfig, SqliteStore};
use harvest_workflow::ParameterTemplate;

/// File name of the state database inside the state directory.
pub const DB_FILE: &str = "harvest.db";

/// File name of the optional orchestrator config inside the state directory.
pub const CONFIG_FILE: &str = "config.yaml";

/// Resolve the state directory (`--state-dir`/`HARVEST_STATE_DIR`, else
/// `~/.harvest/`), creating it if needed.
pub fn state_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let state_dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
            .join(".harvest"),
    };
    if !state_dir.exists() {
        fs::create_dir_all(&state_dir).with_context(|| {
            format!("Failed to create state directory: {}", state_dir.display())
        })?;
    }
    Ok(state_dir)
}

/// Open the SQLite state store in the state directory.
pub fn open_store(explicit: Option<&Path>) -> Result<Arc<SqliteStore>> {
    let db_path = state_dir(explicit)?.join(DB_FILE);
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open state store at {}", db_path.display()))?;
    Ok(Arc::new(store))
}

/// A `CollectionService` over the local state store.
pub fn open_service(explicit: Option<&Path>) -> Result<CollectionService> {
    Ok(CollectionService::new(open_store(explicit)?))
}

/// Load the orchestrator config: an explicit file, else `config.yaml` in the
/// state directory when present, else defaults.
pub fn load_config(path: Option<&Path>, state_dir: &Path) -> Result<OrchestratorConfig> {
    let candidate = match path {
        Some(path) => Some(path.to_path_buf()),
        None => Some(state_dir.join(CONFIG_FILE)).filter(|p| p.exists()),
    };
    match candidate {
        Some(path) => OrchestratorConfig::from_yaml_file(&path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(OrchestratorConfig::default()),
    }
}

/// Parse `--params` JSON into a parameter template.
pub fn parse_params(raw: Option<&str>) -> Result<ParameterTemplate> {
    let Some(raw) = raw else {
        return Ok(ParameterTemplate::default());
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).context("Parameters must be valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(ParameterTemplate::new(map)),
        _ => anyhow::bail!("Parameters must be a JSON object"),
    }
}

/// Colour a collection status for terminal output.
pub fn styled_status(status: CollectionStatus) -> StyledObject<&'static str> {
    let name = status.name();
    match status {
        CollectionStatus::Completed => style(name).green(),
        CollectionStatus::Failed | CollectionStatus::Cancelled => style(name).red(),
        CollectionStatus::Pending | CollectionStatus::Paused => style(name).yellow(),
        CollectionStatus::Running => style(name).cyan(),
    }
}

/// A fixed-width text progress bar.
pub fn progress_bar(percentage: u8, width: usize) -> String {
    let filled = usize::from(percentage.min(100)) * width / 100;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}
