use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};

use crate::model::{Collection, Item};
use crate::reconcile::WorkList;
use crate::utils::wrap_text;

/// Render a transcript file: filename stem, source URL, wrapped body
pub fn format_transcript(item: &Item, body: &str, width: usize) -> String {
    format!("{}\n\n{}\n\n{}", item.stem(), item.url, wrap_text(body, width))
}

/// Where an item's transcript lives under a kind root
pub fn transcript_path(root: &Path, collection: &Collection, item: &Item) -> PathBuf {
    root.join(&collection.name).join(&item.filename)
}

/// Save a rendered transcript, creating parent directories as needed
pub async fn save_transcript(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs_err::tokio::create_dir_all(parent).await?;
    }
    fs_err::tokio::write(path, content).await?;
    Ok(())
}

/// Print the pending work of a run to console
pub fn print_work_list(work: &WorkList) {
    if work.is_empty() {
        println!("{} Nothing new for {}", style("✓").green(), work.kind);
        return;
    }

    println!(
        "{} {} new {} item(s) in {} collection(s), {} already known",
        style("→").cyan(),
        work.item_count(),
        work.kind,
        work.len(),
        work.known_items()
    );
    for entry in work.entries() {
        println!("  {} ({})", style(&entry.collection.name).bold(), entry.items.len());
        for item in &entry.items {
            println!("    {}", item.filename);
        }
    }
}
