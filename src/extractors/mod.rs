use async_trait::async_trait;
use std::sync::Arc;

pub mod blog;
pub mod http;
pub mod youtube;

use crate::config::{Config, RunOptions};
use crate::model::{Collection, ContentKind, Item};
use crate::Result;

/// Enumerates the items of a collection from its remote source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// List the collection's items in catalog order.
    ///
    /// Items that cannot be resolved individually are skipped; the other
    /// items keep their original positions.
    async fn enumerate(&self, collection: &Collection) -> Result<Vec<Item>>;

    /// Get the name of this platform
    fn platform_name(&self) -> &'static str;
}

/// Retrieves the transcript text of a single item
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch_transcript(&self, item: &Item) -> Result<String>;
}

/// Catalog and transcript collaborators for one content kind
#[derive(Clone)]
pub struct Extractors {
    pub kind: ContentKind,
    pub catalog: Arc<dyn CatalogSource>,
    pub transcripts: Arc<dyn TranscriptSource>,
}

impl Extractors {
    pub fn new(
        kind: ContentKind,
        catalog: Arc<dyn CatalogSource>,
        transcripts: Arc<dyn TranscriptSource>,
    ) -> Self {
        Self {
            kind,
            catalog,
            transcripts,
        }
    }

    /// Build the real collaborators for `options.kind`
    pub fn from_config(config: &Config, options: &RunOptions) -> Result<Self> {
        match options.kind {
            ContentKind::Video => {
                let youtube = Arc::new(youtube::YoutubeExtractor::from_config(config)?);
                Ok(Self::new(ContentKind::Video, youtube.clone(), youtube))
            }
            ContentKind::Blog => {
                let blog = Arc::new(blog::BlogExtractor::from_config(config, options)?);
                Ok(Self::new(ContentKind::Blog, blog.clone(), blog))
            }
        }
    }
}
