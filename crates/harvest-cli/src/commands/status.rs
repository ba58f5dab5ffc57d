//! Status command implementation.
//!
//! Shows a collection's progress from the local state store.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use harvest_sched::{CollectionProgress, WeekStatus};

use super::common::{open_service, progress_bar, styled_status};

/// Execute the status command.
pub async fn execute(state_dir: Option<&Path>, id: &str, weeks: bool, json: bool) -> Result<()> {
    let service = open_service(state_dir)?;
    let progress = service
        .progress(id)
        .await
        .with_context(|| format!("Failed to read progress of {id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
        return Ok(());
    }

    print_summary(&progress);
    if weeks {
        print_weeks(&progress);
    }
    Ok(())
}

fn print_summary(progress: &CollectionProgress) {
    println!(
        "{} Collection {} ({}): {}",
        style("→").cyan().bold(),
        style(&progress.public_id).cyan().bold(),
        progress.collection_type,
        styled_status(progress.status).bold()
    );
    println!(
        "  {} {:>3}%  {}/{} weeks",
        style(progress_bar(progress.progress_percentage, 30)).green(),
        progress.progress_percentage,
        progress.weeks_completed,
        progress.target_weeks
    );
    println!(
        "  Range: {} to {}",
        progress.start_date, progress.end_date
    );
    println!(
        "  Weeks: {} completed, {} running, {} pending, {} failed",
        style(progress.counts.completed).green(),
        style(progress.counts.running).cyan(),
        style(progress.counts.pending).yellow(),
        style(progress.counts.failed).red()
    );
    if progress.retry_count > 0 {
        println!("  Retries: {}", progress.retry_count);
    }
    if let Some(error) = &progress.error_message {
        println!("  Error: {}", style(error).red());
    }
    println!(
        "  Updated: {}",
        progress.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn print_weeks(progress: &CollectionProgress) {
    println!();
    println!(
        "  {:<12}  {:<12}  {:<10}  {:>8}  {}",
        style("START").bold(),
        style("END").bold(),
        style("STATUS").bold(),
        style("ROWS").bold(),
        style("DETAIL").bold()
    );
    println!("  {}", "-".repeat(80));

    for week in &progress.weeks {
        let name = week.status.name();
        let status_styled = match week.status {
            WeekStatus::Completed => style(name).green(),
            WeekStatus::Failed => style(name).red(),
            WeekStatus::Running => style(name).cyan(),
            WeekStatus::Pending => style(name).yellow(),
        };
        let rows = week
            .row_count
            .map_or_else(|| "-".to_string(), |r| r.to_string());
        let detail = match (&week.error_message, &week.data_checksum) {
            (Some(error), _) => error.clone(),
            (None, Some(checksum)) => format!("sha256 {}", &checksum[..checksum.len().min(12)]),
            (None, None) => String::new(),
        };

        println!(
            "  {:<12}  {:<12}  {:<10}  {:>8}  {}",
            week.week_start_date.to_string(),
            week.week_end_date.to_string(),
            status_styled,
            rows,
            style(detail).dim()
        );
    }
}
