//! Cross-project insights for `flens insights`.

use anyhow::Result;
use fragment_lens_core::insight::find_insights;
use fragment_lens_core::models::{truncate_text, RESULT_TEXT_LIMIT};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_insights(
    config: &Config,
    project_id: &str,
    module_tag: &str,
    max_insights: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut params = config.insights.params();
    if let Some(max) = max_insights {
        params.max_insights = max;
    }

    let store = SqliteStore::open(config).await?;
    let outcome = find_insights(&store, project_id, module_tag, &params).await;
    store.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if let Some(error) = &outcome.error {
        eprintln!("Warning: {}", error);
    }

    if outcome.items.is_empty() {
        println!("No insights.");
        return Ok(());
    }

    for (i, insight) in outcome.items.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, insight.confidence, insight.pattern);
        println!("    {}", insight.recommendation);
        println!(
            "    projects: {}",
            insight
                .related_project_ids
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!("    seed: {}", insight.seed_fragment_id);
        for related in &insight.related_fragments {
            println!(
                "    - [{:.2}] {} / {}: \"{}\"",
                related.score,
                related.fragment.project_id,
                related.fragment.source_document,
                truncate_text(&related.fragment.text, RESULT_TEXT_LIMIT)
                    .replace('\n', " ")
                    .trim()
            );
        }
        println!();
    }
    Ok(())
}
