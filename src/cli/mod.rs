use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{DedupStrategy, RunOverrides};
use crate::model::{ContentKind, MatchKey};

#[derive(Parser)]
#[command(
    name = "harvester",
    about = "Transcript Harvester - fetch new video and blog transcripts, skipping what you already have",
    version,
    long_about = "Enumerates configured YouTube playlists and blog sections, compares them against transcripts already on disk or recorded in a metadata store, and fetches only the new ones."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(short, long, global = true, value_name = "FILE", env = "HARVESTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every new transcript
    Run(RunArgs),

    /// Show what a run would fetch without fetching anything
    Plan(RunArgs),

    /// List configured collections
    Sources {
        /// Which sources to list
        #[arg(short, long, value_enum, default_value = "all")]
        source: SourceArg,
    },

    /// Check or show the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Which sources to harvest
    #[arg(short, long, value_enum, default_value = "all")]
    pub source: SourceArg,

    /// Where already-fetched items are looked up (overrides the config file)
    #[arg(short, long, value_enum)]
    pub dedup: Option<DedupArg>,

    /// Maximum concurrent transcript fetches
    #[arg(long, value_name = "COUNT")]
    pub max_workers: Option<usize>,

    /// Maximum collections enumerated at the same time
    #[arg(long, value_name = "COUNT")]
    pub max_parallel_collections: Option<usize>,

    /// Maximum pagination depth of a blog crawl
    #[arg(long, value_name = "DEPTH")]
    pub crawl_depth: Option<usize>,

    /// Maximum listing pages per blog crawl
    #[arg(long, value_name = "COUNT")]
    pub max_pages: Option<usize>,

    /// File name comparison: 'exact' or 'prefix:<N>'
    #[arg(long, value_name = "KEY")]
    pub match_key: Option<MatchKey>,
}

impl RunArgs {
    pub fn overrides(&self, dry_run: bool, quiet: bool) -> RunOverrides {
        RunOverrides {
            dedup: self.dedup.map(Into::into),
            max_workers: self.max_workers,
            max_parallel_collections: self.max_parallel_collections,
            max_depth: self.crawl_depth,
            max_pages: self.max_pages,
            match_key: self.match_key,
            dry_run,
            quiet,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceArg {
    /// YouTube playlists
    Video,
    /// Blog sections
    Blog,
    /// Videos first, then blogs
    All,
}

impl SourceArg {
    pub fn kinds(&self) -> Vec<ContentKind> {
        match self {
            SourceArg::Video => vec![ContentKind::Video],
            SourceArg::Blog => vec![ContentKind::Blog],
            SourceArg::All => vec![ContentKind::Video, ContentKind::Blog],
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupArg {
    /// Transcript files on disk
    Local,
    /// Metadata store records
    Store,
}

impl From<DedupArg> for DedupStrategy {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::Local => DedupStrategy::Local,
            DedupArg::Store => DedupStrategy::Store,
        }
    }
}

impl std::fmt::Display for SourceArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceArg::Video => write!(f, "video"),
            SourceArg::Blog => write!(f, "blog"),
            SourceArg::All => write!(f, "all"),
        }
    }
}
