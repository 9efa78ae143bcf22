//! Metadata store adapter: the remote record of what has been fetched.
//!
//! Every collection is stored as one flat document keyed by its source URL
//! (`pl_url` for playlists, `base_url` for blog sections). Writes are upserts
//! that replace a collection's whole document.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::model::{derive_filename, Collection, ContentKind};
use crate::Result;

pub mod document;
pub mod file;
pub mod memory;
pub mod mongo;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// One previously fetched item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedItem {
    pub url: String,
    pub title: String,
    pub filename: String,
}

/// Recorded state of one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedCollection {
    pub source_url: String,
    pub name: String,
    pub items: Vec<RecordedItem>,
}

/// Everything recorded for one content kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub collections: Vec<RecordedCollection>,
}

impl InventoryRecord {
    pub fn get(&self, source_url: &str) -> Option<&RecordedCollection> {
        self.collections
            .iter()
            .find(|collection| collection.source_url == source_url)
    }

    /// Derive file names for recorded items stored without one, from the
    /// configured collection with the same source URL and the item's stored
    /// position. Items of unconfigured collections stay nameless.
    ///
    /// Returns how many names were filled in.
    pub fn fill_missing_filenames(
        &mut self,
        kind: ContentKind,
        configured: &[Collection],
    ) -> usize {
        let mut filled = 0;
        for recorded in &mut self.collections {
            let Some(collection) = configured.iter().find(|c| c.source_url == recorded.source_url)
            else {
                continue;
            };
            for (idx, item) in recorded.items.iter_mut().enumerate() {
                if !item.filename.is_empty() || item.title.is_empty() {
                    continue;
                }
                item.filename = derive_filename(
                    kind,
                    &collection.key,
                    idx + 1,
                    &item.title,
                    collection.title_suffix.as_deref(),
                );
                filled += 1;
            }
        }
        filled
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.collections.iter().map(|c| c.items.len()).sum()
    }
}

/// Persistent record of fetched items, one logical collection per content kind
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read the record for `kind`; an empty record when nothing was stored yet
    async fn read(&self, kind: ContentKind) -> Result<InventoryRecord>;

    /// Upsert one document per collection in `record`
    async fn write(&self, kind: ContentKind, record: &InventoryRecord) -> Result<()>;

    /// Name of this backend for logs
    fn backend_name(&self) -> &'static str;
}

/// Build the configured store, if any
pub fn from_config(config: &StoreConfig) -> Result<Option<Arc<dyn MetadataStore>>> {
    let store: Arc<dyn MetadataStore> = match config.backend {
        StoreBackend::None => return Ok(None),
        StoreBackend::File => {
            let path = config
                .path
                .clone()
                .context("store.path is required for the file backend")?;
            Arc::new(JsonFileStore::new(path, config.collection_names()))
        }
        StoreBackend::Mongodb => Arc::new(MongoStore::from_config(config)?),
    };
    Ok(Some(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(url: &str, items: &[&str]) -> RecordedCollection {
        RecordedCollection {
            source_url: url.to_string(),
            name: url.to_uppercase(),
            items: items
                .iter()
                .map(|name| RecordedItem {
                    url: format!("{}/{}", url, name),
                    title: name.to_string(),
                    filename: format!("{}.txt", name),
                })
                .collect(),
        }
    }

    #[test]
    fn test_fill_missing_filenames_from_configured_collection() {
        let mut record = InventoryRecord {
            collections: vec![
                collection("https://example.com/blog/", &["A/B", "C"]),
                collection("gone", &["D"]),
            ],
        };
        for recorded in &mut record.collections {
            for item in &mut recorded.items {
                item.filename.clear();
            }
        }
        record.collections[0].items[1].filename = "CSB01E02-Kept.txt".to_string();

        let mut configured = Collection::new("CSB01", "Articles", "https://example.com/blog/");
        configured.title_suffix = Some(" | Example".to_string());

        let filled = record.fill_missing_filenames(ContentKind::Blog, &[configured]);
        assert_eq!(filled, 1);

        let names: Vec<&str> = record.collections[0]
            .items
            .iter()
            .map(|item| item.filename.as_str())
            .collect();
        assert_eq!(names, vec!["CSB01E01-A&B | Example.txt", "CSB01E02-Kept.txt"]);
        assert_eq!(record.get("gone").unwrap().items[0].filename, "");
        assert_eq!(record.item_count(), 3);
    }
}
