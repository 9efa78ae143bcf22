use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::document::{from_document, to_document, upsert_documents};
use super::{InventoryRecord, MetadataStore};
use crate::config::CollectionNames;
use crate::model::ContentKind;
use crate::Result;

/// Document store kept as one JSON array per content kind under a directory
pub struct JsonFileStore {
    dir: PathBuf,
    names: CollectionNames,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>, names: CollectionNames) -> Self {
        Self {
            dir: dir.into(),
            names,
        }
    }

    fn collection_path(&self, kind: ContentKind) -> PathBuf {
        self.dir.join(format!("{}.json", self.names.for_kind(kind)))
    }

    fn load_documents(path: &Path) -> Result<Vec<Value>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs_err::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store file {}", path.display()))
    }

    /// Write through a temporary file in the same directory and rename it into place
    fn save_documents(&self, path: &Path, documents: &[Value]) -> Result<()> {
        fs_err::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("Failed to create temporary store file")?;
        serde_json::to_writer_pretty(&mut tmp, documents)?;
        tmp.flush()?;
        tmp.persist(path)
            .with_context(|| format!("Failed to replace store file {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonFileStore {
    async fn read(&self, kind: ContentKind) -> Result<InventoryRecord> {
        let path = self.collection_path(kind);
        tracing::debug!("Reading {} inventory from {}", kind, path.display());

        let documents = Self::load_documents(&path)?;
        let collections = documents
            .into_iter()
            .map(|doc| from_document(kind, doc))
            .collect::<Result<Vec<_>>>()?;
        Ok(InventoryRecord { collections })
    }

    async fn write(&self, kind: ContentKind, record: &InventoryRecord) -> Result<()> {
        let path = self.collection_path(kind);
        tracing::debug!(
            "Upserting {} {} documents into {}",
            record.collections.len(),
            kind,
            path.display()
        );

        let incoming = record
            .collections
            .iter()
            .map(|collection| to_document(kind, collection))
            .collect::<Result<Vec<_>>>()?;

        let mut documents = Self::load_documents(&path)?;
        upsert_documents(kind, &mut documents, incoming);
        self.save_documents(&path, &documents)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RecordedCollection, RecordedItem};
    use tempfile::TempDir;

    fn record(url: &str, filenames: &[&str]) -> InventoryRecord {
        InventoryRecord {
            collections: vec![RecordedCollection {
                source_url: url.to_string(),
                name: "Blog".to_string(),
                items: filenames
                    .iter()
                    .enumerate()
                    .map(|(i, name)| RecordedItem {
                        url: format!("{}{}", url, i),
                        title: format!("Title {}", i),
                        filename: name.to_string(),
                    })
                    .collect(),
            }],
        }
    }

    #[tokio::test]
    async fn test_read_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path(), CollectionNames::default());
        assert!(store.read(ContentKind::Blog).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("store"), CollectionNames::default());

        let first = record("https://example.com/a/", &["K01E01-A.txt"]);
        store.write(ContentKind::Blog, &first).await.unwrap();
        let other = record("https://example.com/b/", &["K02E01-B.txt"]);
        store.write(ContentKind::Blog, &other).await.unwrap();

        let read = store.read(ContentKind::Blog).await.unwrap();
        assert_eq!(read.collections.len(), 2);
        assert_eq!(read.get("https://example.com/a/"), first.get("https://example.com/a/"));

        // video documents live in a separate file
        assert!(store.read(ContentKind::Video).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_replaces_collection_document() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path(), CollectionNames::default());
        let url = "https://example.com/a/";

        store
            .write(ContentKind::Blog, &record(url, &["K01E01-A.txt", "K01E02-B.txt"]))
            .await
            .unwrap();
        store
            .write(ContentKind::Blog, &record(url, &["K01E01-A.txt"]))
            .await
            .unwrap();

        let read = store.read(ContentKind::Blog).await.unwrap();
        assert_eq!(read.collections.len(), 1);
        assert_eq!(read.item_count(), 1);
    }
}
