//! Reconciliation of the remote catalog against what is already known.
//!
//! Everything in here is pure: no I/O, same input gives the same output.
//! An item is known when its match key equals the match key of any name in
//! the inventory for its collection; position never matters for that
//! decision, only for ordering the output.

use std::collections::{HashMap, HashSet};

use crate::inventory::Inventory;
use crate::model::{Catalog, Collection, ContentKind, Item, MatchKey};
use crate::store::{InventoryRecord, RecordedCollection, RecordedItem};

/// Indices, within one catalog collection, of the items that are kept.
///
/// Computed once per collection and used to select whole items, so urls,
/// titles and file names can never drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeptIndices(Vec<usize>);

impl KeptIndices {
    /// Keep every item whose match key is not in `known`
    pub fn unknown(items: &[Item], known: &HashSet<String>, match_key: MatchKey) -> Self {
        Self(
            items
                .iter()
                .enumerate()
                .filter(|(_, item)| !known.contains(match_key.key(&item.filename)))
                .map(|(idx, _)| idx)
                .collect(),
        )
    }

    pub fn select<T: Clone>(&self, sequence: &[T]) -> Vec<T> {
        self.0.iter().map(|&idx| sequence[idx].clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// New items of one collection, in catalog order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkEntry {
    pub collection: Collection,
    pub items: Vec<Item>,
}

/// Collections with at least one item still to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkList {
    pub kind: ContentKind,
    entries: Vec<WorkEntry>,
    known_items: usize,
}

impl WorkList {
    pub fn entries(&self) -> &[WorkEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<WorkEntry> {
        self.entries
    }

    pub fn get(&self, source_url: &str) -> Option<&WorkEntry> {
        self.entries
            .iter()
            .find(|entry| entry.collection.source_url == source_url)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of collections with work
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn item_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.items.len()).sum()
    }

    /// Catalog items that were skipped because they are already known
    pub fn known_items(&self) -> usize {
        self.known_items
    }
}

/// Compute which catalog items still need fetching.
///
/// Collections end up in discovery order, items in their per-collection
/// order; collections without new items are left out entirely. Inventory
/// entries for collections missing from the catalog are ignored.
pub fn reconcile(catalog: &Catalog, inventory: &Inventory, match_key: MatchKey) -> WorkList {
    let mut entries = Vec::new();
    let mut known_items = 0;

    for entry in catalog.collections() {
        let known = inventory.known_keys(&entry.collection.source_url, match_key);
        let kept = KeptIndices::unknown(&entry.items, &known, match_key);
        known_items += entry.items.len() - kept.len();

        tracing::debug!(
            "Collection '{}': {} items, {} new",
            entry.collection.name,
            entry.items.len(),
            kept.len()
        );

        if kept.is_empty() {
            continue;
        }
        entries.push(WorkEntry {
            collection: entry.collection.clone(),
            items: kept.select(&entry.items),
        });
    }

    WorkList {
        kind: catalog.kind,
        entries,
        known_items,
    }
}

/// Build the store documents that need rewriting after a run.
///
/// Each collection's new document lists the catalog items that were known
/// or fetched in this run (catalog order), followed by items only the store
/// remembers. Documents identical to what `existing` holds are omitted.
pub fn updated_record(
    catalog: &Catalog,
    inventory: &Inventory,
    match_key: MatchKey,
    existing: &InventoryRecord,
    fetched: &HashMap<String, HashSet<String>>,
) -> InventoryRecord {
    let mut record = InventoryRecord::default();
    let nothing_fetched = HashSet::new();

    for entry in catalog.collections() {
        let source_url = &entry.collection.source_url;
        let known = inventory.known_keys(source_url, match_key);
        let fetched_here = fetched.get(source_url).unwrap_or(&nothing_fetched);

        let mut items: Vec<RecordedItem> = entry
            .items
            .iter()
            .filter(|item| {
                known.contains(match_key.key(&item.filename)) || fetched_here.contains(&item.url)
            })
            .map(|item| RecordedItem {
                url: item.url.clone(),
                title: item.title.clone(),
                filename: item.filename.clone(),
            })
            .collect();

        let previous = existing.get(source_url);
        if let Some(previous) = previous {
            let listed: HashSet<String> = items.iter().map(|i| i.url.clone()).collect();
            items.extend(
                previous
                    .items
                    .iter()
                    .filter(|item| !listed.contains(&item.url))
                    .cloned(),
            );
        }

        if items.is_empty() {
            continue;
        }

        let updated = RecordedCollection {
            source_url: source_url.clone(),
            name: entry.collection.name.clone(),
            items,
        };
        if previous != Some(&updated) {
            record.collections.push(updated);
        }
    }

    record
}
