//! Run orchestration: read what is known, enumerate, reconcile, fetch new
//! transcripts and record them in the metadata store.

use console::style;
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Config, DedupStrategy, RunOptions};
use crate::extractors::Extractors;
use crate::inventory::{scan_transcripts, Inventory};
use crate::model::{Catalog, Collection, ContentKind, Item};
use crate::output::{format_transcript, save_transcript, transcript_path};
use crate::reconcile::{reconcile, updated_record, WorkList};
use crate::store::{self, InventoryRecord, MetadataStore};
use crate::utils::format_duration;
use crate::{HarvestError, Result};

/// Summary of one harvest run
#[derive(Debug)]
pub struct RunReport {
    pub kind: ContentKind,
    pub run_id: Uuid,
    pub collections_enumerated: usize,
    pub items_catalogued: usize,
    pub items_known: usize,
    pub items_new: usize,
    pub fetched: Vec<PathBuf>,
    pub failures: Vec<HarvestError>,
    pub store_documents_written: usize,
    pub dry_run: bool,
    pub elapsed: Duration,
}

impl RunReport {
    /// True when every enumeration and fetch succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn print_summary(&self) {
        let header = if self.dry_run { "Plan" } else { "Run" };
        println!(
            "\n{} {} summary ({})",
            style("📊").cyan(),
            header,
            style(self.kind).bold()
        );
        println!("   Collections enumerated: {}", self.collections_enumerated);
        println!("   Items catalogued: {}", self.items_catalogued);
        println!("   Already known: {}", self.items_known);
        println!("   New: {}", self.items_new);
        if !self.dry_run {
            println!("   Fetched: {}", style(self.fetched.len()).green());
            println!("   Store documents written: {}", self.store_documents_written);
        }
        if !self.failures.is_empty() {
            println!("   Failures: {}", style(self.failures.len()).red());
            for failure in &self.failures {
                println!("     • [{}] {}", failure.stage(), failure);
            }
        }
        println!("   Elapsed: {}", format_duration(self.elapsed.as_secs_f64()));
    }
}

/// Pending work of a run, before anything is fetched
#[derive(Debug)]
pub struct Plan {
    pub work: WorkList,
    pub collections_enumerated: usize,
    pub items_catalogued: usize,
    pub failures: Vec<HarvestError>,
}

/// State gathered before fetching starts
struct Prepared {
    catalog: Catalog,
    inventory: Inventory,
    existing: InventoryRecord,
    work: WorkList,
    failures: Vec<HarvestError>,
}

/// Outcome of one item fetch
struct Fetched {
    collection_url: String,
    item_url: String,
    result: std::result::Result<PathBuf, HarvestError>,
}

/// Incremental transcript harvest for one content kind
pub struct HarvestPipeline {
    config: Config,
    extractors: Extractors,
    store: Option<Arc<dyn MetadataStore>>,
}

impl HarvestPipeline {
    pub fn new(
        config: Config,
        extractors: Extractors,
        store: Option<Arc<dyn MetadataStore>>,
    ) -> Self {
        Self {
            config,
            extractors,
            store,
        }
    }

    /// Build the pipeline with the real collaborators for `options.kind`
    pub fn from_config(config: Config, options: &RunOptions) -> Result<Self> {
        let extractors = Extractors::from_config(&config, options)?;
        let store = store::from_config(&config.store)?;
        Ok(Self::new(config, extractors, store))
    }

    /// Enumerate and reconcile without fetching anything
    pub async fn plan(&self, options: &RunOptions) -> std::result::Result<Plan, HarvestError> {
        let prepared = self.prepare(options).await?;
        Ok(Plan {
            collections_enumerated: prepared.catalog.len(),
            items_catalogued: prepared.catalog.item_count(),
            work: prepared.work,
            failures: prepared.failures,
        })
    }

    /// Harvest everything new for `options.kind`.
    ///
    /// Per-collection and per-item failures end up in the report; store
    /// failures and an unreadable inventory abort the run.
    pub async fn run(&self, options: &RunOptions) -> std::result::Result<RunReport, HarvestError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("harvest", kind = %options.kind, run_id = %run_id);
        self.run_inner(options, run_id).instrument(span).await
    }

    async fn run_inner(
        &self,
        options: &RunOptions,
        run_id: Uuid,
    ) -> std::result::Result<RunReport, HarvestError> {
        let start_time = Instant::now();
        let prepared = self.prepare(options).await?;
        let Prepared {
            catalog,
            inventory,
            existing,
            work,
            mut failures,
        } = prepared;

        let mut report = RunReport {
            kind: options.kind,
            run_id,
            collections_enumerated: catalog.len(),
            items_catalogued: catalog.item_count(),
            items_known: work.known_items(),
            items_new: work.item_count(),
            fetched: Vec::new(),
            failures: Vec::new(),
            store_documents_written: 0,
            dry_run: options.dry_run,
            elapsed: Duration::ZERO,
        };

        if options.dry_run {
            report.failures = failures;
            report.elapsed = start_time.elapsed();
            return Ok(report);
        }

        let mut fetched_urls: HashMap<String, HashSet<String>> = HashMap::new();
        for outcome in self.execute(work, options).await {
            match outcome.result {
                Ok(path) => {
                    fetched_urls
                        .entry(outcome.collection_url)
                        .or_default()
                        .insert(outcome.item_url);
                    report.fetched.push(path);
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    failures.push(e);
                }
            }
        }

        if let Some(store) = &self.store {
            let record = updated_record(
                &catalog,
                &inventory,
                options.match_key,
                &existing,
                &fetched_urls,
            );
            if !record.is_empty() {
                store
                    .write(options.kind, &record)
                    .await
                    .map_err(|source| HarvestError::Store {
                        operation: "write",
                        kind: options.kind,
                        source,
                    })?;
                tracing::info!(
                    "Recorded {} collection(s) in {} store",
                    record.collections.len(),
                    store.backend_name()
                );
            }
            report.store_documents_written = record.collections.len();
        }

        report.failures = failures;
        report.elapsed = start_time.elapsed();
        tracing::info!(
            "Fetched {} of {} new item(s) in {}",
            report.fetched.len(),
            report.items_new,
            format_duration(report.elapsed.as_secs_f64())
        );
        Ok(report)
    }

    async fn prepare(&self, options: &RunOptions) -> std::result::Result<Prepared, HarvestError> {
        let kind = options.kind;
        if kind != self.extractors.kind {
            return Err(HarvestError::Config(format!(
                "pipeline was built for {} but the run asks for {}",
                self.extractors.kind, kind
            )));
        }

        let mut existing = match &self.store {
            Some(store) => store.read(kind).await.map_err(|source| HarvestError::Store {
                operation: "read",
                kind,
                source,
            })?,
            None => InventoryRecord::default(),
        };
        let filled = existing.fill_missing_filenames(kind, self.config.collections(kind));
        if filled > 0 {
            tracing::info!("Derived {} missing file name(s) from stored titles", filled);
        }

        let inventory = match options.dedup {
            DedupStrategy::Store => {
                if self.store.is_none() {
                    return Err(HarvestError::Config(
                        "store dedup requested but no store backend is configured".to_string(),
                    ));
                }
                tracing::info!("{} item(s) recorded in store", existing.item_count());
                Inventory::from_record(&existing)
            }
            DedupStrategy::Local => {
                let names = scan_transcripts(&self.config.output.scan_roots(kind))?;
                tracing::info!("{} transcript file(s) found on disk", names.len());
                Inventory::from_filenames(names)
            }
        };

        let (catalog, failures) = self.enumerate(options).await;
        let work = reconcile(&catalog, &inventory, options.match_key);
        tracing::info!(
            "{} new item(s) in {} collection(s), {} already known",
            work.item_count(),
            work.len(),
            work.known_items()
        );

        Ok(Prepared {
            catalog,
            inventory,
            existing,
            work,
            failures,
        })
    }

    /// Enumerate every configured collection, a bounded number at a time
    async fn enumerate(&self, options: &RunOptions) -> (Catalog, Vec<HarvestError>) {
        let collections = self.config.collections(options.kind);
        let catalog_source = &self.extractors.catalog;
        tracing::info!(
            "Enumerating {} {} collection(s) on {}",
            collections.len(),
            options.kind,
            catalog_source.platform_name()
        );

        let results: Vec<(&Collection, Result<Vec<Item>>)> = stream::iter(collections)
            .map(|collection| async move {
                (collection, catalog_source.enumerate(collection).await)
            })
            .buffered(options.max_parallel_collections.max(1))
            .collect()
            .await;

        let mut catalog = Catalog::new(options.kind);
        let mut failures = Vec::new();
        for (collection, result) in results {
            match result {
                Ok(items) => {
                    tracing::debug!("'{}': {} item(s)", collection.name, items.len());
                    catalog.push(collection.clone(), items);
                }
                Err(source) => {
                    let error = HarvestError::Enumeration {
                        collection: collection.name.clone(),
                        source,
                    };
                    tracing::warn!("{}", error);
                    failures.push(error);
                }
            }
        }
        (catalog, failures)
    }

    /// Fetch and persist every work item with at most `max_workers` in flight
    async fn execute(&self, work: WorkList, options: &RunOptions) -> Vec<Fetched> {
        let total = work.item_count() as u64;
        let jobs: Vec<(Collection, Item)> = work
            .into_entries()
            .into_iter()
            .flat_map(|entry| {
                let collection = entry.collection;
                entry.items.into_iter().map(move |item| (collection.clone(), item))
            })
            .collect();

        let progress = if options.show_progress {
            ProgressBar::new(total)
        } else {
            ProgressBar::hidden()
        };
        progress.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        progress.set_message(format!("Fetching {} transcripts", options.kind));

        let outcomes: Vec<Fetched> = stream::iter(jobs)
            .map(|(collection, item)| {
                let span = tracing::info_span!(
                    "item",
                    collection = %collection.name,
                    file = %item.filename
                );
                let progress = &progress;
                async move {
                    let result = self.fetch_one(&collection, &item).await;
                    progress.inc(1);
                    Fetched {
                        collection_url: collection.source_url,
                        item_url: item.url,
                        result,
                    }
                }
                .instrument(span)
            })
            .buffer_unordered(options.max_workers.max(1))
            .collect()
            .await;

        progress.finish_with_message("Done");
        outcomes
    }

    async fn fetch_one(
        &self,
        collection: &Collection,
        item: &Item,
    ) -> std::result::Result<PathBuf, HarvestError> {
        let text = self
            .extractors
            .transcripts
            .fetch_transcript(item)
            .await
            .map_err(|source| HarvestError::Fetch {
                item: item.filename.clone(),
                source,
            })?;

        if text.trim().is_empty() {
            return Err(HarvestError::Fetch {
                item: item.filename.clone(),
                source: anyhow::anyhow!("transcript is empty"),
            });
        }

        let kind = self.extractors.kind;
        let content = format_transcript(item, &text, self.config.output.line_width);
        let path = transcript_path(&self.config.output.kind_root(kind), collection, item);
        save_transcript(&path, &content)
            .await
            .map_err(|source| HarvestError::Persist {
                path: path.display().to_string(),
                source,
            })?;

        tracing::debug!("Saved {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{MockCatalogSource, MockTranscriptSource};
    use crate::model::MatchKey;
    use crate::store::{MockMetadataStore, RecordedCollection, RecordedItem};
    use tempfile::TempDir;

    const PLAYLIST: &str = "https://www.youtube.com/playlist?list=PL1";
    const BROKEN: &str = "https://www.youtube.com/playlist?list=PL2";

    fn config(root: &TempDir) -> Config {
        let mut config = Config::default();
        config.output.root = root.path().to_path_buf();
        config.collections.video = vec![
            Collection::new("CSJ01", "Season 1", PLAYLIST),
            Collection::new("CSJ02", "Season 2", BROKEN),
        ];
        config
    }

    fn options(dedup: DedupStrategy) -> RunOptions {
        RunOptions {
            kind: ContentKind::Video,
            dedup,
            max_workers: 2,
            max_parallel_collections: 2,
            max_depth: 1,
            max_pages: 1,
            match_key: MatchKey::Exact,
            dry_run: false,
            show_progress: false,
        }
    }

    fn playlist_items(collection: &Collection) -> Vec<Item> {
        ["One", "Two", "Three"]
            .iter()
            .enumerate()
            .map(|(idx, title)| {
                Item::new(
                    ContentKind::Video,
                    collection,
                    idx + 1,
                    format!("https://www.youtube.com/watch?v={}", title.to_lowercase()),
                    *title,
                )
            })
            .collect()
    }

    fn catalog_source() -> MockCatalogSource {
        let mut catalog = MockCatalogSource::new();
        catalog.expect_platform_name().return_const("YouTube");
        catalog.expect_enumerate().returning(|collection| {
            if collection.source_url == BROKEN {
                anyhow::bail!("HTTP Error 404")
            }
            Ok(playlist_items(collection))
        });
        catalog
    }

    fn transcripts() -> MockTranscriptSource {
        let mut transcripts = MockTranscriptSource::new();
        transcripts.expect_fetch_transcript().returning(|item| {
            if item.title == "Three" {
                Ok("   ".to_string())
            } else {
                Ok(format!("transcript of {}", item.title))
            }
        });
        transcripts
    }

    fn known_record() -> InventoryRecord {
        InventoryRecord {
            collections: vec![RecordedCollection {
                source_url: PLAYLIST.to_string(),
                name: "Season 1".to_string(),
                items: vec![RecordedItem {
                    url: "https://www.youtube.com/watch?v=one".to_string(),
                    title: "One".to_string(),
                    filename: "CSJ01E01-One.txt".to_string(),
                }],
            }],
        }
    }

    fn pipeline(
        root: &TempDir,
        catalog: MockCatalogSource,
        transcripts: MockTranscriptSource,
        store: Option<MockMetadataStore>,
    ) -> HarvestPipeline {
        let extractors =
            Extractors::new(ContentKind::Video, Arc::new(catalog), Arc::new(transcripts));
        let store = store.map(|store| Arc::new(store) as Arc<dyn MetadataStore>);
        HarvestPipeline::new(config(root), extractors, store)
    }

    #[tokio::test]
    async fn test_run_fetches_new_items_and_records_them() {
        let root = TempDir::new().unwrap();
        let mut store = MockMetadataStore::new();
        store.expect_backend_name().return_const("mock");
        store.expect_read().times(1).returning(|_| Ok(known_record()));
        store
            .expect_write()
            .times(1)
            .withf(|kind, record| {
                let names: Vec<&str> = record.collections[0]
                    .items
                    .iter()
                    .map(|item| item.filename.as_str())
                    .collect();
                *kind == ContentKind::Video
                    && record.collections.len() == 1
                    && names == ["CSJ01E01-One.txt", "CSJ01E02-Two.txt"]
            })
            .returning(|_, _| Ok(()));

        let pipeline = pipeline(&root, catalog_source(), transcripts(), Some(store));
        let report = pipeline.run(&options(DedupStrategy::Store)).await.unwrap();

        assert_eq!(report.collections_enumerated, 1);
        assert_eq!(report.items_catalogued, 3);
        assert_eq!(report.items_known, 1);
        assert_eq!(report.items_new, 2);
        assert_eq!(report.store_documents_written, 1);

        let expected = root.path().join("video").join("Season 1").join("CSJ01E02-Two.txt");
        assert_eq!(report.fetched, vec![expected.clone()]);
        let content = std::fs::read_to_string(expected).unwrap();
        assert!(content.starts_with("CSJ01E02-Two\n\nhttps://www.youtube.com/watch?v=two\n\n"));
        assert!(content.ends_with("transcript of Two"));

        let stages: Vec<_> = report.failures.iter().map(HarvestError::stage).collect();
        assert_eq!(stages.len(), 2);
        assert!(stages.contains(&crate::Stage::Enumerate));
        assert!(stages.contains(&crate::Stage::Fetch));
        assert!(!root.path().join("video").join("Season 1").join("CSJ01E03-Three.txt").exists());
    }

    #[tokio::test]
    async fn test_local_dedup_skips_files_on_disk() {
        let root = TempDir::new().unwrap();
        let season = root.path().join("video").join("Season 1");
        std::fs::create_dir_all(&season).unwrap();
        std::fs::write(season.join("CSJ01E02-Two.txt"), "already here").unwrap();

        let pipeline = pipeline(&root, catalog_source(), transcripts(), None);
        let report = pipeline.run(&options(DedupStrategy::Local)).await.unwrap();

        assert_eq!(report.items_known, 1);
        assert_eq!(report.fetched, vec![season.join("CSJ01E01-One.txt")]);
        assert_eq!(
            std::fs::read_to_string(season.join("CSJ01E02-Two.txt")).unwrap(),
            "already here"
        );
    }

    #[tokio::test]
    async fn test_store_read_failure_aborts_before_enumeration() {
        let root = TempDir::new().unwrap();
        let mut catalog = MockCatalogSource::new();
        catalog.expect_platform_name().return_const("YouTube");
        catalog.expect_enumerate().times(0);
        let mut transcripts = MockTranscriptSource::new();
        transcripts.expect_fetch_transcript().times(0);
        let mut store = MockMetadataStore::new();
        store
            .expect_read()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let pipeline = pipeline(&root, catalog, transcripts, Some(store));
        let err = pipeline.run(&options(DedupStrategy::Store)).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.stage(), crate::Stage::Store);
    }

    #[tokio::test]
    async fn test_store_write_failure_is_fatal() {
        let root = TempDir::new().unwrap();
        let mut store = MockMetadataStore::new();
        store.expect_backend_name().return_const("mock");
        store.expect_read().returning(|_| Ok(InventoryRecord::default()));
        store
            .expect_write()
            .returning(|_, _| Err(anyhow::anyhow!("timeout")));

        let pipeline = pipeline(&root, catalog_source(), transcripts(), Some(store));
        let err = pipeline.run(&options(DedupStrategy::Local)).await.unwrap_err();
        assert_eq!(err.stage(), crate::Stage::Store);
    }

    #[tokio::test]
    async fn test_plan_does_not_fetch() {
        let root = TempDir::new().unwrap();
        let mut transcripts = MockTranscriptSource::new();
        transcripts.expect_fetch_transcript().times(0);

        let pipeline = pipeline(&root, catalog_source(), transcripts, None);
        let plan = pipeline.plan(&options(DedupStrategy::Local)).await.unwrap();
        assert_eq!(plan.work.item_count(), 3);
        assert_eq!(plan.collections_enumerated, 1);
        assert_eq!(plan.failures.len(), 1);

        let mut dry = options(DedupStrategy::Local);
        dry.dry_run = true;
        let report = pipeline.run(&dry).await.unwrap();
        assert!(report.fetched.is_empty());
        assert_eq!(report.items_new, 3);
    }

    #[tokio::test]
    async fn test_store_dedup_requires_store() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline(&root, catalog_source(), transcripts(), None);
        let err = pipeline.run(&options(DedupStrategy::Store)).await.unwrap_err();
        assert_eq!(err.stage(), crate::Stage::Config);
    }
}
