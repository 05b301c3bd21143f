//! Index overview for `rag status`.
//!
//! Shows what the last ingestion produced: record count, per-file breakdown
//! and when the index was written.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::index::{SqliteIndex, VectorIndex};
use crate::migrate;

/// Query the index and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let index = SqliteIndex::from_pool(pool.clone());

    let total = index.count().await?;
    let sources = index.sources().await?;
    let last_written: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM records")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("rag status");
    println!("==========");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Documents:   {}", config.documents.root.display());
    println!();
    println!("  Files:       {}", sources.len());
    println!("  Records:     {}", total);
    println!(
        "  Ingested:    {}",
        last_written
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !sources.is_empty() {
        println!();
        println!("  By file:");
        println!("  {:<48} {:>8}", "SOURCE", "RECORDS");
        println!("  {}", "-".repeat(57));
        for (source, n) in &sources {
            println!("  {:<48} {:>8}", source, n);
        }
    }

    println!();
    index.close().await;
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

/// Relative age of a Unix timestamp, e.g. "3 hours ago".
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    match delta {
        d if d < 0 => format_ts_iso(ts),
        d if d < 60 => "just now".to_string(),
        d if d < 3600 => plural(d / 60, "min"),
        d if d < 86400 => plural(d / 3600, "hour"),
        d if d < 86400 * 30 => plural(d / 86400, "day"),
        _ => format_ts_iso(ts),
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
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
    fn bytes_are_humanised() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now - 86400 * 3), "3 days ago");
    }
}
