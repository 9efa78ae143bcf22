//! Core data model: collections, items and the per-run catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two content sources a collection can come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Blog,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Blog => "blog",
        }
    }

    /// Field that identifies a collection's document in the metadata store
    pub fn store_key_field(&self) -> &'static str {
        match self {
            ContentKind::Video => "pl_url",
            ContentKind::Blog => "base_url",
        }
    }

    /// Replacement for `/` when a title becomes part of a file name
    fn slash_replacement(&self) -> &'static str {
        match self {
            ContentKind::Video => " & ",
            ContentKind::Blog => "&",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, ordered grouping of fetchable items (a playlist or a blog section)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Short stable identifier used as the file name prefix
    pub key: String,

    /// Display name, used as the folder name
    pub name: String,

    /// Remote locator the items are enumerated from
    #[serde(rename = "url")]
    pub source_url: String,

    /// Appended to every derived title (blog sections carry the site name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_suffix: Option<String>,
}

impl Collection {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            source_url: source_url.into(),
            title_suffix: None,
        }
    }

    pub fn with_title_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.title_suffix = Some(suffix.into());
        self
    }
}

/// A single fetchable unit (a video or an article)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub url: String,

    /// Raw display name from the remote source
    pub title: String,

    /// 1-based position within the collection
    pub position: usize,

    pub filename: String,
}

impl Item {
    pub fn new(
        kind: ContentKind,
        collection: &Collection,
        position: usize,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let filename = derive_filename(
            kind,
            &collection.key,
            position,
            &title,
            collection.title_suffix.as_deref(),
        );
        Self {
            url: url.into(),
            title,
            position,
            filename,
        }
    }

    /// File name without the `.txt` extension, used as the transcript header
    pub fn stem(&self) -> &str {
        self.filename.strip_suffix(".txt").unwrap_or(&self.filename)
    }
}

/// Derive the on-disk file name of an item.
///
/// Must stay stable across releases: existing files and store records are
/// matched against names produced here.
pub fn derive_filename(
    kind: ContentKind,
    collection_key: &str,
    position: usize,
    title: &str,
    suffix: Option<&str>,
) -> String {
    let title = title.replace('/', kind.slash_replacement());
    let suffix = suffix.unwrap_or("").replace('/', kind.slash_replacement());
    format!("{}E{:02}-{}{}.txt", collection_key, position, title, suffix)
}

/// How two file names are compared when deciding whether an item is known.
///
/// `Prefix` compares only the first N characters. With the usual
/// `<KEY>E<NN>-` naming a 9 character prefix covers key and episode, so a
/// renamed title is still recognised; two different titles sharing the
/// prefix are treated as the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MatchKey {
    Exact,
    Prefix(usize),
}

impl MatchKey {
    pub fn key<'a>(&self, filename: &'a str) -> &'a str {
        match self {
            MatchKey::Exact => filename,
            MatchKey::Prefix(len) => match filename.char_indices().nth(*len) {
                Some((idx, _)) => &filename[..idx],
                None => filename,
            },
        }
    }
}

impl Default for MatchKey {
    fn default() -> Self {
        MatchKey::Exact
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKey::Exact => write!(f, "exact"),
            MatchKey::Prefix(len) => write!(f, "prefix:{}", len),
        }
    }
}

impl FromStr for MatchKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("exact") {
            return Ok(MatchKey::Exact);
        }
        let len = s
            .strip_prefix("prefix:")
            .ok_or_else(|| format!("invalid match key '{}': expected 'exact' or 'prefix:<N>'", s))?;
        match len.trim().parse::<usize>() {
            Ok(0) | Err(_) => Err(format!("invalid prefix length in '{}'", s)),
            Ok(len) => Ok(MatchKey::Prefix(len)),
        }
    }
}

impl TryFrom<String> for MatchKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MatchKey> for String {
    fn from(value: MatchKey) -> Self {
        value.to_string()
    }
}

/// One collection together with the items discovered for it in this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCollection {
    pub collection: Collection,
    pub items: Vec<Item>,
}

/// Everything enumerated from the remote sources in the current run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub kind: ContentKind,
    collections: Vec<CatalogCollection>,
}

impl Catalog {
    pub fn new(kind: ContentKind) -> Self {
        Self {
            kind,
            collections: Vec::new(),
        }
    }

    /// Add an enumerated collection. Collections without items are dropped
    /// here, so nothing downstream ever sees them.
    pub fn push(&mut self, collection: Collection, items: Vec<Item>) -> bool {
        if items.is_empty() {
            tracing::debug!("Dropping empty collection '{}'", collection.name);
            return false;
        }
        self.collections.push(CatalogCollection { collection, items });
        true
    }

    pub fn collections(&self) -> &[CatalogCollection] {
        &self.collections
    }

    pub fn get(&self, source_url: &str) -> Option<&CatalogCollection> {
        self.collections
            .iter()
            .find(|entry| entry.collection.source_url == source_url)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.collections.iter().map(|entry| entry.items.len()).sum()
    }
}
