//! `tutor documents` and `tutor extract`: inspect what is indexed and what
//! the extractor sees in a PDF.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::extract::extract_pdf_pages;
use crate::services::Services;

pub async fn run_documents(config: &Config) -> Result<()> {
    let services = Services::open(config).await?;
    let sources = services.store.list_sources().await?;

    if sources.is_empty() {
        println!("No documents ingested.");
        services.close().await;
        return Ok(());
    }

    println!("{:<48} CHUNKS", "DOCUMENT");
    for source in &sources {
        let count = services.store.chunk_count(source).await?;
        println!("{:<48} {}", source, count);
    }

    services.close().await;
    Ok(())
}

/// Dump extracted text, page by page, to stdout or `out`.
pub fn run_extract(path: &Path, out: Option<&Path>) -> Result<()> {
    let pages = extract_pdf_pages(path)
        .with_context(|| format!("Failed to extract {}", path.display()))?;

    let mut dump = String::new();
    for (i, page) in pages.iter().enumerate() {
        dump.push_str(&format!("--- page {} ({} chars) ---\n", i + 1, page.chars().count()));
        dump.push_str(page);
        if !page.ends_with('\n') {
            dump.push('\n');
        }
    }
    let total: usize = pages.iter().map(|p| p.chars().count()).sum();

    match out {
        Some(out) => {
            std::fs::write(out, &dump)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!(
                "extracted {} pages ({} chars) to {}",
                pages.len(),
                total,
                out.display()
            );
        }
        None => {
            print!("{}", dump);
            println!("--- {} pages, {} chars ---", pages.len(), total);
        }
    }
    Ok(())
}
