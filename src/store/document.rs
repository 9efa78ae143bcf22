use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{RecordedCollection, RecordedItem};
use crate::model::ContentKind;
use crate::Result;

/// Stored shape of a playlist
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VideoDocument {
    pl_url: String,
    #[serde(default)]
    sv_path: String,
    vd_url: Vec<String>,
    /// Derived file names
    vid_name: Vec<String>,
    #[serde(default)]
    vid_title: Vec<String>,
}

/// Stored shape of a blog section
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlogDocument {
    base_url: String,
    #[serde(default)]
    sv_path: String,
    /// Raw article titles
    video_name: Vec<String>,
    video_link: Vec<String>,
    /// Derived file names; absent from documents that only carry titles
    #[serde(default)]
    file_name: Vec<String>,
}

/// Value of the upsert key of a stored document
pub fn document_key(kind: ContentKind, document: &Value) -> Option<&str> {
    document.get(kind.store_key_field()).and_then(Value::as_str)
}

pub fn to_document(kind: ContentKind, collection: &RecordedCollection) -> Result<Value> {
    let urls = collection.items.iter().map(|i| i.url.clone()).collect();
    let titles = collection.items.iter().map(|i| i.title.clone()).collect();
    let filenames = collection.items.iter().map(|i| i.filename.clone()).collect();

    let value = match kind {
        ContentKind::Video => serde_json::to_value(VideoDocument {
            pl_url: collection.source_url.clone(),
            sv_path: collection.name.clone(),
            vd_url: urls,
            vid_name: filenames,
            vid_title: titles,
        })?,
        ContentKind::Blog => serde_json::to_value(BlogDocument {
            base_url: collection.source_url.clone(),
            sv_path: collection.name.clone(),
            video_name: titles,
            video_link: urls,
            file_name: filenames,
        })?,
    };
    Ok(value)
}

/// Parse a stored document. The per-item arrays must line up; a document
/// whose arrays differ in length is rejected rather than guessed at.
/// Blog documents without file names yield items with an empty `filename`,
/// see [`InventoryRecord::fill_missing_filenames`](super::InventoryRecord::fill_missing_filenames).
pub fn from_document(kind: ContentKind, document: Value) -> Result<RecordedCollection> {
    let (source_url, name, urls, titles, filenames) = match kind {
        ContentKind::Video => {
            let doc: VideoDocument =
                serde_json::from_value(document).context("Malformed playlist document")?;
            let titles = if doc.vid_title.is_empty() {
                vec![String::new(); doc.vd_url.len()]
            } else {
                doc.vid_title
            };
            (doc.pl_url, doc.sv_path, doc.vd_url, titles, doc.vid_name)
        }
        ContentKind::Blog => {
            let doc: BlogDocument =
                serde_json::from_value(document).context("Malformed blog document")?;
            let filenames = if doc.file_name.is_empty() {
                vec![String::new(); doc.video_name.len()]
            } else {
                doc.file_name
            };
            (doc.base_url, doc.sv_path, doc.video_link, doc.video_name, filenames)
        }
    };

    if urls.len() != titles.len() || urls.len() != filenames.len() {
        anyhow::bail!(
            "Document for '{}' has misaligned item arrays ({} urls, {} titles, {} file names)",
            source_url,
            urls.len(),
            titles.len(),
            filenames.len()
        );
    }

    let items = urls
        .into_iter()
        .zip(titles)
        .zip(filenames)
        .map(|((url, title), filename)| RecordedItem { url, title, filename })
        .collect();

    Ok(RecordedCollection {
        source_url,
        name,
        items,
    })
}

/// Upsert `incoming` into `documents` by the kind's key field
pub fn upsert_documents(kind: ContentKind, documents: &mut Vec<Value>, incoming: Vec<Value>) {
    for document in incoming {
        let key = document_key(kind, &document).map(str::to_string);
        let existing = documents
            .iter_mut()
            .find(|stored| key.is_some() && document_key(kind, stored) == key.as_deref());
        match existing {
            Some(stored) => *stored = document,
            None => documents.push(document),
        }
    }
}
