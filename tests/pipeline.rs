use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use transcript_harvester::config::{Config, DedupStrategy, RunOptions};
use transcript_harvester::extractors::{CatalogSource, Extractors, TranscriptSource};
use transcript_harvester::model::{Collection, ContentKind, Item, MatchKey};
use transcript_harvester::store::{JsonFileStore, MemoryStore, MetadataStore};
use transcript_harvester::HarvestPipeline;

const SECTION: &str = "https://example.com/blog/";

/// Blog section whose article list can change between runs
struct FakeBlog {
    titles: Mutex<Vec<&'static str>>,
}

impl FakeBlog {
    fn new(titles: &[&'static str]) -> Self {
        Self {
            titles: Mutex::new(titles.to_vec()),
        }
    }

    fn publish(&self, title: &'static str) {
        self.titles.lock().unwrap().push(title);
    }
}

#[async_trait]
impl CatalogSource for FakeBlog {
    async fn enumerate(&self, collection: &Collection) -> anyhow::Result<Vec<Item>> {
        let titles = self.titles.lock().unwrap().clone();
        Ok(titles
            .into_iter()
            .enumerate()
            .map(|(idx, title)| {
                let url = format!("{}{}/", collection.source_url, title.to_lowercase());
                Item::new(ContentKind::Blog, collection, idx + 1, url, title)
            })
            .collect())
    }

    fn platform_name(&self) -> &'static str {
        "Fake blog"
    }
}

#[derive(Default)]
struct CountingTranscripts {
    calls: AtomicUsize,
}

#[async_trait]
impl TranscriptSource for CountingTranscripts {
    async fn fetch_transcript(&self, item: &Item) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Words spoken in {}.", item.title))
    }
}

fn config(root: &TempDir) -> Config {
    let mut config = Config::default();
    config.output.root = root.path().join("raw");
    config.collections.blog = vec![Collection::new("CSB01", "Sermons", SECTION)];
    config
}

fn options(dedup: DedupStrategy) -> RunOptions {
    RunOptions {
        kind: ContentKind::Blog,
        dedup,
        max_workers: 4,
        max_parallel_collections: 1,
        max_depth: 1,
        max_pages: 1,
        match_key: MatchKey::Exact,
        dry_run: false,
        show_progress: false,
    }
}

fn pipeline(
    config: Config,
    blog: &Arc<FakeBlog>,
    transcripts: &Arc<CountingTranscripts>,
    store: Option<Arc<dyn MetadataStore>>,
) -> HarvestPipeline {
    let extractors = Extractors::new(ContentKind::Blog, blog.clone(), transcripts.clone());
    HarvestPipeline::new(config, extractors, store)
}

#[tokio::test]
async fn store_dedup_only_fetches_new_articles() {
    let root = TempDir::new().unwrap();
    let blog = Arc::new(FakeBlog::new(&["Alpha", "Beta"]));
    let transcripts = Arc::new(CountingTranscripts::default());
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(config(&root), &blog, &transcripts, Some(store.clone()));
    let options = options(DedupStrategy::Store);

    let first = pipeline.run(&options).await.unwrap();
    assert_eq!(first.fetched.len(), 2);
    assert!(first.is_clean());
    assert_eq!(store.document_count(ContentKind::Blog).await, 1);

    let second = pipeline.run(&options).await.unwrap();
    assert_eq!(second.items_new, 0);
    assert_eq!(second.items_known, 2);
    assert_eq!(second.store_documents_written, 0);
    assert_eq!(transcripts.calls.load(Ordering::SeqCst), 2);

    blog.publish("Gamma");
    let third = pipeline.run(&options).await.unwrap();
    assert_eq!(third.items_new, 1);
    assert_eq!(transcripts.calls.load(Ordering::SeqCst), 3);

    let record = store.read(ContentKind::Blog).await.unwrap();
    let names: Vec<&str> = record.collections[0]
        .items
        .iter()
        .map(|item| item.filename.as_str())
        .collect();
    assert_eq!(names, ["CSB01E01-Alpha.txt", "CSB01E02-Beta.txt", "CSB01E03-Gamma.txt"]);
    assert_eq!(store.document_count(ContentKind::Blog).await, 1);
}

#[tokio::test]
async fn local_dedup_recognises_files_from_earlier_runs() {
    let root = TempDir::new().unwrap();
    let blog = Arc::new(FakeBlog::new(&["Alpha", "Beta"]));
    let transcripts = Arc::new(CountingTranscripts::default());
    let pipeline = pipeline(config(&root), &blog, &transcripts, None);
    let options = options(DedupStrategy::Local);

    let first = pipeline.run(&options).await.unwrap();
    let alpha = root.path().join("raw").join("blog").join("Sermons").join("CSB01E01-Alpha.txt");
    assert!(first.fetched.contains(&alpha));
    assert_eq!(
        std::fs::read_to_string(&alpha).unwrap(),
        format!("CSB01E01-Alpha\n\n{}alpha/\n\nWords spoken in Alpha.", SECTION)
    );

    let second = pipeline.run(&options).await.unwrap();
    assert!(second.fetched.is_empty());
    assert_eq!(transcripts.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn file_store_survives_between_pipelines() {
    let root = TempDir::new().unwrap();
    let config = config(&root);
    let store_dir = root.path().join("store");
    let blog = Arc::new(FakeBlog::new(&["Alpha"]));
    let transcripts = Arc::new(CountingTranscripts::default());

    let store: Arc<dyn MetadataStore> =
        Arc::new(JsonFileStore::new(&store_dir, config.store.collection_names()));
    let first = pipeline(config.clone(), &blog, &transcripts, Some(store));
    first.run(&options(DedupStrategy::Store)).await.unwrap();
    assert!(store_dir.join("blog.json").exists());

    let reopened: Arc<dyn MetadataStore> =
        Arc::new(JsonFileStore::new(&store_dir, config.store.collection_names()));
    let second = pipeline(config, &blog, &transcripts, Some(reopened));
    let report = second.run(&options(DedupStrategy::Store)).await.unwrap();
    assert_eq!(report.items_new, 0);
    assert_eq!(transcripts.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn titles_only_store_documents_count_as_known() {
    let root = TempDir::new().unwrap();
    let config = config(&root);
    let store_dir = root.path().join("store");
    std::fs::create_dir_all(&store_dir).unwrap();
    let stored = serde_json::json!([{
        "base_url": SECTION,
        "video_name": ["Alpha", "Beta"],
        "video_link": [format!("{}alpha/", SECTION), format!("{}beta/", SECTION)],
    }]);
    std::fs::write(store_dir.join("blog.json"), stored.to_string()).unwrap();

    let blog = Arc::new(FakeBlog::new(&["Alpha", "Beta", "Gamma"]));
    let transcripts = Arc::new(CountingTranscripts::default());
    let store: Arc<dyn MetadataStore> =
        Arc::new(JsonFileStore::new(&store_dir, config.store.collection_names()));
    let pipeline = pipeline(config, &blog, &transcripts, Some(store.clone()));

    let report = pipeline.run(&options(DedupStrategy::Store)).await.unwrap();
    assert_eq!(report.items_known, 2);
    assert_eq!(report.items_new, 1);
    assert_eq!(transcripts.calls.load(Ordering::SeqCst), 1);

    let record = store.read(ContentKind::Blog).await.unwrap();
    let names: Vec<&str> = record.collections[0]
        .items
        .iter()
        .map(|item| item.filename.as_str())
        .collect();
    assert_eq!(names, ["CSB01E01-Alpha.txt", "CSB01E02-Beta.txt", "CSB01E03-Gamma.txt"]);
}

/// Transcript source that records how many fetches overlap
#[derive(Default)]
struct SlowTranscripts {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl TranscriptSource for SlowTranscripts {
    async fn fetch_transcript(&self, item: &Item) -> anyhow::Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("Words spoken in {}.", item.title))
    }
}

#[tokio::test]
async fn concurrent_fetches_stay_under_worker_ceiling() {
    let root = TempDir::new().unwrap();
    let blog = Arc::new(FakeBlog::new(&["A", "B", "C", "D", "E", "F"]));
    let transcripts = Arc::new(SlowTranscripts::default());
    let extractors = Extractors::new(ContentKind::Blog, blog, transcripts.clone());
    let pipeline = HarvestPipeline::new(config(&root), extractors, None);

    let options = RunOptions {
        max_workers: 2,
        ..options(DedupStrategy::Local)
    };
    let report = pipeline.run(&options).await.unwrap();

    assert_eq!(report.fetched.len(), 6);
    assert!(transcripts.peak.load(Ordering::SeqCst) <= 2);
    assert!(transcripts.peak.load(Ordering::SeqCst) >= 1);
}
