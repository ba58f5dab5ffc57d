//! List command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use harvest_sched::{CollectionFilter, CollectionStatus};

use super::common::{open_service, styled_status};

/// Execute the list command.
pub async fn execute(
    state_dir: Option<&Path>,
    user: Option<&str>,
    status: Option<&str>,
    limit: usize,
) -> Result<()> {
    let mut filter = CollectionFilter::new().with_limit(limit);
    if let Some(user) = user {
        filter = filter.with_user(user);
    }
    if let Some(status) = status {
        let parsed = CollectionStatus::parse(status).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown status '{status}'. Available: pending, running, paused, completed, failed, cancelled"
            )
        })?;
        filter = filter.with_statuses(&[parsed]);
    }

    let service = open_service(state_dir)?;
    let collections = service
        .list(&filter)
        .await
        .context("Failed to list collections")?;

    if collections.is_empty() {
        println!("No collections found.");
        return Ok(());
    }

    println!(
        "{} {} collection(s):\n",
        style("→").cyan().bold(),
        collections.len()
    );
    println!(
        "  {:<16}  {:<14}  {:<10}  {:>7}  {:<16}  {}",
        style("ID").bold(),
        style("TYPE").bold(),
        style("STATUS").bold(),
        style("WEEKS").bold(),
        style("USER").bold(),
        style("CREATED").bold()
    );
    println!("  {}", "-".repeat(90));

    for collection in &collections {
        println!(
            "  {:<16}  {:<14}  {:<10}  {:>7}  {:<16}  {}",
            style(collection.public_id.as_str()).dim(),
            collection.collection_type.name(),
            styled_status(collection.status),
            format!("{}/{}", collection.weeks_completed, collection.target_weeks),
            collection.user_id,
            collection.created_at.format("%Y-%m-%d %H:%M"),
        );
    }

    Ok(())
}
