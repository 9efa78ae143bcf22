use anyhow::Context;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::Client;
use tokio::sync::OnceCell;

use super::document::{from_document, to_document};
use super::{InventoryRecord, MetadataStore, RecordedCollection};
use crate::config::{CollectionNames, StoreConfig};
use crate::model::ContentKind;
use crate::Result;

/// MongoDB collections, one per content kind, with one document per
/// playlist or blog section
pub struct MongoStore {
    uri: String,
    database: String,
    names: CollectionNames,
    client: OnceCell<Client>,
}

/// Filter selecting the stored document with the same key as `document`
pub fn upsert_filter(kind: ContentKind, document: &Document) -> Result<Document> {
    let field = kind.store_key_field();
    let key = document
        .get_str(field)
        .with_context(|| format!("Document is missing its '{}' key", field))?;
    let mut filter = Document::new();
    filter.insert(field, key);
    Ok(filter)
}

/// Update replacing every field of the stored document with `document`'s
pub fn upsert_update(document: Document) -> Document {
    doc! { "$set": document }
}

pub fn to_bson(kind: ContentKind, collection: &RecordedCollection) -> Result<Document> {
    let value = to_document(kind, collection)?;
    mongodb::bson::to_document(&value).context("Failed to encode store document")
}

/// Parse a stored document, ignoring the database's own `_id`
pub fn from_bson(kind: ContentKind, mut document: Document) -> Result<RecordedCollection> {
    document.remove("_id");
    from_document(kind, Bson::Document(document).into_relaxed_extjson())
}

impl MongoStore {
    pub fn new(
        uri: impl Into<String>,
        database: impl Into<String>,
        names: CollectionNames,
    ) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            names,
            client: OnceCell::new(),
        }
    }

    /// Connection string from `store.uri`, or else from the variable named by `store.uri_env`
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let uri = match &config.uri {
            Some(uri) => uri.clone(),
            None => std::env::var(&config.uri_env)
                .with_context(|| format!("Environment variable {} is not set", config.uri_env))?,
        };
        Ok(Self::new(uri, config.database.clone(), config.collection_names()))
    }

    async fn collection(&self, kind: ContentKind) -> Result<mongodb::Collection<Document>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                Client::with_uri_str(&self.uri)
                    .await
                    .context("Failed to connect to MongoDB")
            })
            .await?;
        Ok(client
            .database(&self.database)
            .collection(self.names.for_kind(kind)))
    }
}

#[async_trait]
impl MetadataStore for MongoStore {
    async fn read(&self, kind: ContentKind) -> Result<InventoryRecord> {
        tracing::info!(
            "Communicating with store: '{}/{}'",
            self.database,
            self.names.for_kind(kind)
        );

        let documents: Vec<Document> = self
            .collection(kind)
            .await?
            .find(doc! {})
            .await
            .context("find failed")?
            .try_collect()
            .await
            .context("Failed to read store cursor")?;

        let collections = documents
            .into_iter()
            .map(|document| from_bson(kind, document))
            .collect::<Result<Vec<_>>>()?;
        Ok(InventoryRecord { collections })
    }

    async fn write(&self, kind: ContentKind, record: &InventoryRecord) -> Result<()> {
        tracing::info!(
            "Uploading {} documents to '{}/{}'",
            record.collections.len(),
            self.database,
            self.names.for_kind(kind)
        );

        let target = self.collection(kind).await?;
        for collection in &record.collections {
            let document = to_bson(kind, collection)?;
            let filter = upsert_filter(kind, &document)?;
            target
                .update_one(filter, upsert_update(document))
                .upsert(true)
                .await
                .with_context(|| format!("updateOne for '{}' failed", collection.source_url))?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }
}
