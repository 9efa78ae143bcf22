//! Transcript Harvester - collects video and blog transcripts incrementally
//!
//! The crate enumerates remote collections (video playlists and blog sections),
//! reconciles them against what has already been fetched (files on disk or a
//! metadata store), and fetches and persists only the new transcripts.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod inventory;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod store;
pub mod utils;

pub use cli::{Cli, Commands, DedupArg, SourceArg};
pub use config::{Config, DedupStrategy, RunOptions};
pub use extractors::{CatalogSource, TranscriptSource};
pub use inventory::Inventory;
pub use model::{Catalog, CatalogCollection, Collection, ContentKind, Item, MatchKey};
pub use pipeline::{HarvestPipeline, Plan, RunReport};
pub use reconcile::{reconcile, WorkList};
pub use store::{InventoryRecord, MetadataStore};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Scan,
    Enumerate,
    Fetch,
    Persist,
    Store,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Config => write!(f, "config"),
            Stage::Scan => write!(f, "scan"),
            Stage::Enumerate => write!(f, "enumerate"),
            Stage::Fetch => write!(f, "fetch"),
            Stage::Persist => write!(f, "persist"),
            Stage::Store => write!(f, "store"),
        }
    }
}

/// Error types specific to the harvester
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("local inventory scan of {root} failed: {source}")]
    Scan {
        root: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("enumeration of collection '{collection}' failed: {source}")]
    Enumeration {
        collection: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("fetching '{item}' failed: {source}")]
    Fetch {
        item: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("writing '{path}' failed: {source}")]
    Persist {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("metadata store {operation} for '{kind}' failed: {source}")]
    Store {
        operation: &'static str,
        kind: ContentKind,
        #[source]
        source: anyhow::Error,
    },
}

impl HarvestError {
    pub fn stage(&self) -> Stage {
        match self {
            HarvestError::Config(_) => Stage::Config,
            HarvestError::Scan { .. } => Stage::Scan,
            HarvestError::Enumeration { .. } => Stage::Enumerate,
            HarvestError::Fetch { .. } => Stage::Fetch,
            HarvestError::Persist { .. } => Stage::Persist,
            HarvestError::Store { .. } => Stage::Store,
        }
    }

    /// Fatal errors abort the run; the rest only affect one collection or item.
    pub fn is_fatal(&self) -> bool {
        matches!(self.stage(), Stage::Config | Stage::Scan | Stage::Store)
    }
}
