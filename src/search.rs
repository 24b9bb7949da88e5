//! `tutor search`: show exactly which chunks a question retrieves from a
//! document, with scores. Useful when the tutor answers "I couldn't find
//! specific information" and you want to know why.

use anyhow::{bail, Result};

use socratic_tutor_core::embedding::embed_query;

use crate::config::Config;
use crate::services::Services;

pub async fn run_search(
    config: &Config,
    query: &str,
    document: &str,
    limit: Option<usize>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let services = Services::open(config).await?;
    let top_k = limit.unwrap_or(config.retrieval.top_k);

    let query_vec = embed_query(services.embedder.as_ref(), query).await?;
    let hits = services
        .store
        .search(&query_vec, Some(document), top_k)
        .await?;

    if hits.is_empty() {
        println!("No results.");
        services.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} #{}",
            i + 1,
            hit.score,
            hit.source_id,
            hit.sequence_index
        );
        let excerpt: String = hit.text.replace('\n', " ").chars().take(240).collect();
        println!("    excerpt: \"{}\"", excerpt.trim());
        println!("    id: {}", hit.chunk_id);
        println!();
    }

    services.close().await;
    Ok(())
}
