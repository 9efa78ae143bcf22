//! What has already been fetched, from disk or from the metadata store.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::MatchKey;
use crate::store::InventoryRecord;

pub mod local;

pub use local::scan_transcripts;

/// File names known to exist, either for every collection (disk scan) or
/// for one collection, keyed by its source URL (store record).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    global: BTreeSet<String>,
    by_collection: HashMap<String, BTreeSet<String>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inventory built from a local scan; names apply to all collections
    pub fn from_filenames<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            global: filenames.into_iter().map(Into::into).collect(),
            by_collection: HashMap::new(),
        }
    }

    /// Inventory built from a metadata store record
    pub fn from_record(record: &InventoryRecord) -> Self {
        let mut inventory = Self::new();
        for collection in &record.collections {
            for item in collection.items.iter().filter(|item| !item.filename.is_empty()) {
                inventory.insert(&collection.source_url, item.filename.clone());
            }
        }
        inventory
    }

    pub fn insert(&mut self, collection_url: &str, filename: impl Into<String>) {
        self.by_collection
            .entry(collection_url.to_string())
            .or_default()
            .insert(filename.into());
    }

    pub fn insert_global(&mut self, filename: impl Into<String>) {
        self.global.insert(filename.into());
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.by_collection.values().all(|names| names.is_empty())
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.by_collection.values().map(|names| names.len()).sum::<usize>()
    }

    /// Match keys of every name that counts as known for `collection_url`
    pub fn known_keys(&self, collection_url: &str, match_key: MatchKey) -> HashSet<String> {
        let scoped = self.by_collection.get(collection_url).into_iter().flatten();
        self.global
            .iter()
            .chain(scoped)
            .map(|name| match_key.key(name).to_string())
            .collect()
    }
}
