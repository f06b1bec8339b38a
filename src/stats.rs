//! Database statistics.
//!
//! `crm stats` prints row counts per table, the funnel tables, and when each
//! export was last imported.

use anyhow::Result;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Tables reported by `crm stats`, in display order.
const TABLES: [(&str, &str); 10] = [
    ("LPs", "lp"),
    ("GPs", "gp"),
    ("Distributors", "distributor"),
    ("People", "person"),
    ("Funds", "fund"),
    ("Notes", "note"),
    ("Todos", "todo"),
    ("Roadshows", "roadshow"),
    ("Interests", "fund_lp_interest"),
    ("RS statuses", "roadshow_lp_status"),
];

/// Row count per entry of [`TABLES`].
pub async fn table_counts(pool: &SqlitePool) -> Result<Vec<(&'static str, i64)>> {
    let mut counts = Vec::with_capacity(TABLES.len());
    for (label, table) in TABLES {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await?;
        counts.push((label, count));
    }
    Ok(counts)
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let counts = table_counts(&pool).await?;

    let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM todo WHERE status != 'completed'")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("LP CRM — Database Stats");
    println!("=======================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    for (label, count) in &counts {
        println!("  {:<13} {}", format!("{}:", label), count);
    }
    println!("  {:<13} {}", "Open todos:", pending);

    let checkpoints: Vec<(String, i64, NaiveDateTime)> = sqlx::query_as(
        "SELECT source, row_count, imported_at FROM import_checkpoints ORDER BY source",
    )
    .fetch_all(&pool)
    .await?;

    if !checkpoints.is_empty() {
        println!();
        println!("  Imports:");
        println!("  {:<24} {:>6}   {}", "SOURCE", "ROWS", "LAST IMPORT");
        println!("  {}", "-".repeat(50));
        for (source, rows, imported_at) in &checkpoints {
            println!(
                "  {:<24} {:>6}   {}",
                source,
                rows,
                format_ts_relative(imported_at.and_utc().timestamp())
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
