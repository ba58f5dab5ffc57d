//! Pause, resume, cancel and reset commands.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use super::common::{open_service, styled_status};

/// A status change requested from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pause,
    Resume,
    Cancel,
    Reset,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Cancel => "cancel",
            Action::Reset => "reset",
        }
    }
}

/// Execute a control command.
pub async fn execute(state_dir: Option<&Path>, action: Action, id: &str) -> Result<()> {
    let service = open_service(state_dir)?;

    let collection = match action {
        Action::Pause => service.pause(id).await,
        Action::Resume => service.resume(id).await,
        Action::Cancel => service.cancel(id).await,
        Action::Reset => service.reset(id).await,
    }
    .with_context(|| format!("Failed to {} {id}", action.verb()))?;

    println!(
        "{} {} is now {}",
        style("✓").green().bold(),
        style(&collection.public_id).cyan(),
        styled_status(collection.status).bold()
    );
    if action == Action::Pause {
        println!("  A running collection stops after its current week.");
    }

    Ok(())
}
