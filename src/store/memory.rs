use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::document::{from_document, to_document, upsert_documents};
use super::{InventoryRecord, MetadataStore};
use crate::model::ContentKind;
use crate::Result;

/// Store held in process memory, with the same document semantics as the
/// persistent backends
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<ContentKind, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents for `kind`
    pub async fn document_count(&self, kind: ContentKind) -> usize {
        self.documents
            .read()
            .await
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn read(&self, kind: ContentKind) -> Result<InventoryRecord> {
        let documents = self.documents.read().await;
        let collections = documents
            .get(&kind)
            .into_iter()
            .flatten()
            .cloned()
            .map(|doc| from_document(kind, doc))
            .collect::<Result<Vec<_>>>()?;
        Ok(InventoryRecord { collections })
    }

    async fn write(&self, kind: ContentKind, record: &InventoryRecord) -> Result<()> {
        let incoming = record
            .collections
            .iter()
            .map(|collection| to_document(kind, collection))
            .collect::<Result<Vec<_>>>()?;
        let mut documents = self.documents.write().await;
        upsert_documents(kind, documents.entry(kind).or_default(), incoming);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
