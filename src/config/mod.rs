use anyhow::{Context, Result};
use console::style;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::model::{Collection, ContentKind, MatchKey};
use crate::utils::{self, RetryPolicy};
use crate::HarvestError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where transcripts are written and scanned
    pub output: OutputConfig,

    /// Concurrency and HTTP behaviour
    pub fetch: FetchConfig,

    /// Blog crawl limits and extraction schemas
    pub crawl: CrawlConfig,

    pub video: VideoConfig,

    pub blog: BlogConfig,

    /// Which inventory decides what is already fetched
    pub dedup: DedupStrategy,

    pub store: StoreConfig,

    pub logging: LoggingConfig,

    /// Collections to harvest, per content kind
    pub collections: CollectionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Transcripts land in `<root>/<kind>/<collection name>/`
    pub root: PathBuf,

    /// Additional directories whose transcripts count as fetched
    pub extra_scan_roots: ScanRoots,

    /// Line width of the transcript body
    pub line_width: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRoots {
    pub video: Vec<PathBuf>,
    pub blog: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum concurrent item fetches, for both kinds.
    ///
    /// This is a fixed ceiling. It does not follow available memory, so size
    /// it for the host: each in-flight blog fetch holds one parsed article
    /// page, each video fetch one yt-dlp process.
    pub max_workers: usize,

    /// Maximum collections enumerated at the same time
    pub max_parallel_collections: usize,

    /// Backoff on rate-limit responses
    pub retry: RetryPolicy,

    pub request_timeout_secs: u64,

    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Pagination links followed away from the section's first page
    pub max_depth: usize,

    /// Listing pages fetched per section, at most
    pub max_pages: usize,

    /// Substring a link must contain to count as a pagination link
    pub pagination_pattern: String,

    pub listing: ListingSchema,

    pub page: PageSchema,
}

/// CSS selectors for a section's listing pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSchema {
    pub base_selector: String,
    pub article_selector: String,
    pub title_selector: String,
    pub link_attribute: String,
}

/// CSS selectors for an article page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSchema {
    pub base_selector: String,
    pub transcript_selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub yt_dlp_path: String,

    /// Caption languages in order of preference
    pub languages: Vec<String>,

    /// Proxy URL handed to yt-dlp and caption downloads
    pub proxy: Option<String>,

    pub match_key: MatchKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogConfig {
    pub match_key: MatchKey,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupStrategy {
    /// Transcript files present on disk
    #[default]
    Local,
    /// Items recorded in the metadata store
    Store,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    None,
    /// JSON documents in a local directory
    File,
    /// MongoDB deployment
    Mongodb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Directory for the file backend
    pub path: Option<PathBuf>,

    /// Connection string for the mongodb backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Environment variable holding the connection string when `uri` is unset
    pub uri_env: String,

    pub database: String,

    pub video_collection: String,

    pub blog_collection: String,
}

/// Store collection name for each content kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    pub video: String,
    pub blog: String,
}

impl CollectionNames {
    pub fn for_kind(&self, kind: ContentKind) -> &str {
        match kind {
            ContentKind::Video => &self.video,
            ContentKind::Blog => &self.blog,
        }
    }
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            video: "video".to_string(),
            blog: "blog".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a timestamped log file into this directory
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionsConfig {
    pub video: Vec<Collection>,
    pub blog: Vec<Collection>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/raw"),
            extra_scan_roots: ScanRoots::default(),
            line_width: 160,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            max_parallel_collections: 2,
            retry: RetryPolicy::default(),
            request_timeout_secs: 30,
            user_agent: format!("transcript-harvester/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_pages: 50,
            pagination_pattern: "/page/".to_string(),
            listing: ListingSchema::default(),
            page: PageSchema::default(),
        }
    }
}

impl Default for ListingSchema {
    fn default() -> Self {
        Self {
            base_selector: "#left-area".to_string(),
            article_selector: "article".to_string(),
            title_selector: "h2.entry-title a".to_string(),
            link_attribute: "href".to_string(),
        }
    }
}

impl Default for PageSchema {
    fn default() -> Self {
        Self {
            base_selector: "#et-main-area > #main-content".to_string(),
            transcript_selector: "div.et_pb_section.et_pb_section_1 > div.et_pb_row.et_pb_row_1 > div.et_pb_column.et_pb_column_4_4".to_string(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            languages: vec!["en".to_string()],
            proxy: None,
            match_key: MatchKey::Prefix(9),
        }
    }
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            match_key: MatchKey::Exact,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let names = CollectionNames::default();
        Self {
            backend: StoreBackend::None,
            path: None,
            uri: None,
            uri_env: "MONGODB_URI".to_string(),
            database: "transcripts".to_string(),
            video_collection: names.video,
            blog_collection: names.blog,
        }
    }
}

impl StoreConfig {
    pub fn collection_names(&self) -> CollectionNames {
        CollectionNames {
            video: self.video_collection.clone(),
            blog: self.blog_collection.clone(),
        }
    }
}

impl OutputConfig {
    /// Directory the transcripts of `kind` are written to
    pub fn kind_root(&self, kind: ContentKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    /// Every directory scanned for existing transcripts of `kind`
    pub fn scan_roots(&self, kind: ContentKind) -> Vec<PathBuf> {
        let extra = match kind {
            ContentKind::Video => &self.extra_scan_roots.video,
            ContentKind::Blog => &self.extra_scan_roots.blog,
        };
        std::iter::once(self.kind_root(kind))
            .chain(extra.iter().cloned())
            .collect()
    }
}

impl Config {
    /// Load configuration from `path`, the default locations, or create default
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => Self::config_path()?,
        };

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config = Self::from_yaml(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(&config_path).await?;
            // Logging is not set up yet at this point
            eprintln!(
                "{} Wrote default configuration to {}",
                style("✓").green(),
                config_path.display()
            );
            Ok(config)
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("transcript-harvester").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), HarvestError> {
        if self.fetch.max_workers == 0 || self.fetch.max_parallel_collections == 0 {
            return Err(HarvestError::Config(
                "fetch.max_workers and fetch.max_parallel_collections must be at least 1".to_string(),
            ));
        }
        if self.output.line_width == 0 {
            return Err(HarvestError::Config("output.line_width must be at least 1".to_string()));
        }

        for kind in [ContentKind::Video, ContentKind::Blog] {
            let mut keys = HashSet::new();
            let mut urls = HashSet::new();
            for collection in self.collections(kind) {
                if collection.key.trim().is_empty() || collection.name.trim().is_empty() {
                    return Err(HarvestError::Config(format!(
                        "{} collection '{}' needs a key and a name",
                        kind, collection.source_url
                    )));
                }
                utils::validate_and_normalize_url(&collection.source_url).map_err(|e| {
                    HarvestError::Config(format!("{} collection '{}': {}", kind, collection.key, e))
                })?;
                if !keys.insert(collection.key.as_str()) {
                    return Err(HarvestError::Config(format!(
                        "duplicate {} collection key '{}'",
                        kind, collection.key
                    )));
                }
                if !urls.insert(collection.source_url.as_str()) {
                    return Err(HarvestError::Config(format!(
                        "duplicate {} collection url '{}'",
                        kind, collection.source_url
                    )));
                }
            }
        }

        match self.store.backend {
            StoreBackend::None if self.dedup == DedupStrategy::Store => {
                return Err(HarvestError::Config(
                    "dedup: store requires a store backend".to_string(),
                ));
            }
            StoreBackend::File if self.store.path.is_none() => {
                return Err(HarvestError::Config(
                    "store.path is required for the file backend".to_string(),
                ));
            }
            StoreBackend::Mongodb if self.store.uri.is_none() && self.store.uri_env.is_empty() => {
                return Err(HarvestError::Config(
                    "store.uri or store.uri_env is required for the mongodb backend".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn collections(&self, kind: ContentKind) -> &[Collection] {
        match kind {
            ContentKind::Video => &self.collections.video,
            ContentKind::Blog => &self.collections.blog,
        }
    }

    pub fn match_key(&self, kind: ContentKind) -> MatchKey {
        match kind {
            ContentKind::Video => self.video.match_key,
            ContentKind::Blog => self.blog.match_key,
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("{}", style("Current Configuration:").bold());
        println!("  Output Root: {}", self.output.root.display());
        println!("  Line Width: {}", self.output.line_width);
        println!("  Dedup Strategy: {:?}", self.dedup);
        println!("  Store Backend: {:?}", self.store.backend);
        if self.store.backend == StoreBackend::Mongodb {
            println!("  Store Database: {}", self.store.database);
        }
        println!("  Max Workers: {}", self.fetch.max_workers);
        println!("  Max Parallel Collections: {}", self.fetch.max_parallel_collections);
        println!("  Crawl Depth / Pages: {} / {}", self.crawl.max_depth, self.crawl.max_pages);
        println!("  Video Match Key: {}", self.video.match_key);
        println!("  Blog Match Key: {}", self.blog.match_key);
        println!("  Video Collections: {}", self.collections.video.len());
        println!("  Blog Collections: {}", self.collections.blog.len());
    }
}

/// Command line overrides for a single run
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub dedup: Option<DedupStrategy>,
    pub max_workers: Option<usize>,
    pub max_parallel_collections: Option<usize>,
    pub max_depth: Option<usize>,
    pub max_pages: Option<usize>,
    pub match_key: Option<MatchKey>,
    pub dry_run: bool,
    pub quiet: bool,
}

/// Everything a single run needs to know, resolved up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub kind: ContentKind,
    pub dedup: DedupStrategy,
    pub max_workers: usize,
    pub max_parallel_collections: usize,
    pub max_depth: usize,
    pub max_pages: usize,
    pub match_key: MatchKey,
    pub dry_run: bool,
    pub show_progress: bool,
}

impl RunOptions {
    pub fn resolve(
        config: &Config,
        kind: ContentKind,
        overrides: &RunOverrides,
    ) -> std::result::Result<Self, HarvestError> {
        let options = Self {
            kind,
            dedup: overrides.dedup.unwrap_or(config.dedup),
            max_workers: overrides.max_workers.unwrap_or(config.fetch.max_workers),
            max_parallel_collections: overrides
                .max_parallel_collections
                .unwrap_or(config.fetch.max_parallel_collections),
            max_depth: overrides.max_depth.unwrap_or(config.crawl.max_depth),
            max_pages: overrides.max_pages.unwrap_or(config.crawl.max_pages),
            match_key: overrides.match_key.unwrap_or_else(|| config.match_key(kind)),
            dry_run: overrides.dry_run,
            show_progress: !overrides.quiet,
        };

        if options.max_workers == 0 || options.max_parallel_collections == 0 {
            return Err(HarvestError::Config("worker limits must be at least 1".to_string()));
        }
        if options.max_pages == 0 {
            return Err(HarvestError::Config("max pages must be at least 1".to_string()));
        }
        if options.dedup == DedupStrategy::Store && config.store.backend == StoreBackend::None {
            return Err(HarvestError::Config(
                "store dedup requested but no store backend is configured".to_string(),
            ));
        }
        Ok(options)
    }
}
