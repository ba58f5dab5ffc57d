//! Backfill command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use console::style;

use harvest_sched::{BackfillRequest, CollectionType};

use super::common::{open_service, parse_params};

/// Execute the backfill command.
#[allow(clippy::too_many_arguments)]
pub async fn execute(
    state_dir: Option<&Path>,
    workflow: &str,
    instance: &str,
    user: &str,
    weeks: Option<u32>,
    end_date: Option<NaiveDate>,
    weekly: bool,
    params: Option<&str>,
) -> Result<()> {
    let end_date = end_date.unwrap_or_else(|| Utc::now().date_naive() - Duration::days(1));
    let collection_type = if weekly {
        CollectionType::WeeklyUpdate
    } else {
        CollectionType::Backfill
    };

    let mut request = BackfillRequest::new(workflow, instance, user, end_date)
        .with_type(collection_type)
        .with_parameters(parse_params(params)?);
    if let Some(weeks) = weeks {
        request = request.with_weeks(weeks);
    }

    let service = open_service(state_dir)?;
    let collection = service
        .start_backfill(request)
        .await
        .context("Failed to start backfill")?;

    println!(
        "{} Created {} {}",
        style("✓").green().bold(),
        collection.collection_type,
        style(&collection.public_id).cyan().bold()
    );
    println!(
        "  Weeks: {} ({} to {})",
        collection.target_weeks, collection.start_date, collection.end_date
    );
    println!(
        "  Workflow: {}  Instance: {}",
        style(&collection.workflow_ref).yellow(),
        style(&collection.instance_ref).yellow()
    );
    println!(
        "\n  A running `harvest serve` will pick it up. Track it with `harvest status {}`",
        collection.public_id
    );

    Ok(())
}
