//! History listing, clearing, and counts for the CLI.
//!
//! Backs `verity history <category> [--clear]` and `verity stats`.

use anyhow::{bail, Result};
use chrono::Local;

use verity_core::{AnalysisRecord, Category, Severity, MAX_ITEMS};

use crate::config::Config;
use crate::sqlite_store::open_history;

fn parse_category(name: &str) -> Result<Category> {
    match Category::parse(name) {
        Some(c) => Ok(c),
        None => bail!(
            "Unknown category: '{}'. Must be deepfake, audio, image, or misinfo.",
            name
        ),
    }
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Safe => "SAFE",
        Severity::Warning => "REVIEW",
        Severity::Danger => "DANGER",
    }
}

fn print_record(record: &AnalysisRecord) {
    let verdict = record.verdict();
    println!(
        "  {}  {:<12}  [{:<6}] {:<26} {:>5.1}%",
        record
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S"),
        record.short_id(),
        severity_tag(verdict.severity),
        verdict.label,
        record.primary_score()
    );
    println!("      {}", record.display_description());
}

/// Run the history command: list a partition newest first, or clear it.
pub async fn run_history(config: &Config, category: &str, clear: bool) -> Result<()> {
    let category = parse_category(category)?;
    let history = open_history(config).await?;

    if clear {
        history.clear(category).await?;
        println!("Cleared {} history.", category);
        return Ok(());
    }

    let records = history.load(category).await;
    if records.is_empty() {
        println!("No {} analyses yet.", category);
        return Ok(());
    }

    println!(
        "{} history ({} of {}, newest first)",
        category,
        records.len(),
        MAX_ITEMS
    );
    println!();
    for record in &records {
        print_record(record);
    }
    Ok(())
}

/// Run the stats command: per-category record counts and total.
pub async fn run_stats(config: &Config) -> Result<()> {
    let history = open_history(config).await?;
    let stats = history.stats().await;

    println!("Verity: Analysis History");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!();
    for category in Category::ALL {
        println!("  {:<12} {:>3}", category.as_str(), stats.count(category));
    }
    println!("  {}", "-".repeat(16));
    println!("  {:<12} {:>3}", "total", stats.total);
    Ok(())
}
