//! Index statistics and health overview.
//!
//! Summarizes the live generation: fragment counts, per-module and
//! per-project breakdowns, the embedding dimension and when the index was
//! last rebuilt. Used by `flens stats`.

use anyhow::Result;
use fragment_lens_core::maintenance;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let stats = maintenance::stats(&store).await?;
    store.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Fragment Lens — Index Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Fragments:   {}", stats.total_fragments);
    println!("  Generation:  {}", stats.generation);
    println!(
        "  Dimension:   {}",
        stats
            .embedding_dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unset".to_string())
    );
    println!(
        "  Rebuilt:     {}",
        stats
            .last_rebuild_at
            .map(|t| format_ts_relative(t.timestamp()))
            .unwrap_or_else(|| "never".to_string())
    );

    print_breakdown("By module:", "MODULE", &stats.fragments_by_module);
    print_breakdown("By project:", "PROJECT", &stats.fragments_by_project);

    println!();
    Ok(())
}

fn print_breakdown(title: &str, column: &str, counts: &std::collections::BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    println!();
    println!("  {}", title);
    println!("  {:<32} {:>10}", column, "FRAGMENTS");
    println!("  {}", "-".repeat(43));
    for (key, count) in counts {
        println!("  {:<32} {:>10}", key, count);
    }
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
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

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
    fn test_relative_timestamps() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
