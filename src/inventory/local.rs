use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::HarvestError;

/// Collect the base names of all `.txt` transcripts below `roots`.
///
/// A root that does not exist contributes nothing; any other filesystem
/// error aborts the scan.
pub fn scan_transcripts(roots: &[PathBuf]) -> Result<BTreeSet<String>, HarvestError> {
    let mut names = BTreeSet::new();

    for root in roots {
        if !root.exists() {
            tracing::debug!("Scan root {} does not exist, treating as empty", root.display());
            continue;
        }

        let before = names.len();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| HarvestError::Scan {
                root: root.display().to_string(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() || !is_transcript(entry.path()) {
                continue;
            }
            if let Some(name) = entry.path().file_name() {
                names.insert(name.to_string_lossy().to_string());
            }
        }
        tracing::debug!("Found {} transcripts under {}", names.len() - before, root.display());
    }

    Ok(names)
}

fn is_transcript(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}
