use anyhow::{anyhow, Context};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use url::Url;

use super::http::HttpFetcher;
use super::{CatalogSource, TranscriptSource};
use crate::config::{Config, CrawlConfig, RunOptions};
use crate::model::{Collection, ContentKind, Item};
use crate::utils::normalize_whitespace;
use crate::Result;

fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid CSS selector '{}': {}", css, e))
}

/// Compiled listing and page schemas
struct Schemas {
    listing_base: Selector,
    article: Selector,
    title: Selector,
    link_attribute: String,
    anchor: Selector,
    page_base: Selector,
    transcript: Selector,
}

impl Schemas {
    fn compile(crawl: &CrawlConfig) -> Result<Self> {
        Ok(Self {
            listing_base: compile(&crawl.listing.base_selector)?,
            article: compile(&crawl.listing.article_selector)?,
            title: compile(&crawl.listing.title_selector)?,
            link_attribute: crawl.listing.link_attribute.clone(),
            anchor: compile("a[href]")?,
            page_base: compile(&crawl.page.base_selector)?,
            transcript: compile(&crawl.page.transcript_selector)?,
        })
    }
}

/// What one listing page yields
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// `(title, link)` pairs in document order
    pub entries: Vec<(String, String)>,
    /// Further listing pages, ascending by page number
    pub next_pages: Vec<Url>,
}

/// Best-first frontier over pagination links.
///
/// Pages come out in ascending page number whatever order they were found
/// in; ties go to the shallower page. Unnumbered pages rank as page 1.
#[derive(Debug)]
pub struct CrawlFrontier {
    queue: BTreeMap<(u32, usize, String), Url>,
    seen: HashSet<String>,
    pagination_pattern: String,
    max_depth: usize,
    max_pages: usize,
    visited: usize,
}

fn page_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.as_str().trim_end_matches('/').to_string()
}

impl CrawlFrontier {
    pub fn new(start: Url, pagination_pattern: &str, max_depth: usize, max_pages: usize) -> Self {
        let mut frontier = Self {
            queue: BTreeMap::new(),
            seen: HashSet::new(),
            pagination_pattern: pagination_pattern.to_string(),
            max_depth,
            max_pages,
            visited: 0,
        };
        frontier.push(start, 0);
        frontier
    }

    fn push(&mut self, url: Url, depth: usize) {
        let key = page_key(&url);
        if self.seen.insert(key.clone()) {
            let number = page_number(&url, &self.pagination_pattern).unwrap_or(1);
            self.queue.insert((number, depth, key), url);
        }
    }

    /// Next page to visit with its depth, until the page budget is spent
    pub fn next_page(&mut self) -> Option<(Url, usize)> {
        if self.visited >= self.max_pages {
            return None;
        }
        let ((_, depth, _), url) = self.queue.pop_first()?;
        self.visited += 1;
        Some((url, depth))
    }

    /// Queue the links found on a page at `depth`
    pub fn extend(&mut self, depth: usize, links: Vec<Url>) {
        if depth >= self.max_depth {
            return;
        }
        for link in links {
            self.push(link, depth + 1);
        }
    }

    pub fn visited(&self) -> usize {
        self.visited
    }
}

/// Page number following `pattern` in the URL path, e.g. `/page/3/` gives 3
pub fn page_number(url: &Url, pattern: &str) -> Option<u32> {
    let path = url.path();
    let start = path.find(pattern)? + pattern.len();
    let digits: String = path[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Readable title from the last path segment of an article link
pub fn slug_title(url: &Url) -> Option<String> {
    let slug = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(slug).ok()?;
    let title = normalize_whitespace(&decoded.replace('-', " "));
    (!title.is_empty()).then_some(title)
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Scraper-backed blog catalog and article transcript source
pub struct BlogExtractor {
    http: HttpFetcher,
    schemas: Schemas,
    pagination_pattern: String,
    max_depth: usize,
    max_pages: usize,
}

impl BlogExtractor {
    pub fn new(
        http: HttpFetcher,
        crawl: &CrawlConfig,
        max_depth: usize,
        max_pages: usize,
    ) -> Result<Self> {
        Ok(Self {
            http,
            schemas: Schemas::compile(crawl)?,
            pagination_pattern: crawl.pagination_pattern.clone(),
            max_depth,
            max_pages,
        })
    }

    pub fn from_config(config: &Config, options: &RunOptions) -> Result<Self> {
        let http = HttpFetcher::new(&config.fetch, None)?;
        Self::new(http, &config.crawl, options.max_depth, options.max_pages)
    }

    /// Extract article entries and pagination links from a listing page
    pub fn parse_listing(&self, html: &str, page_url: &Url) -> ListingPage {
        let document = Html::parse_document(html);
        let mut page = ListingPage::default();

        for base in document.select(&self.schemas.listing_base) {
            for article in base.select(&self.schemas.article) {
                let Some(title_element) = article.select(&self.schemas.title).next() else {
                    continue;
                };
                let Some(link) = title_element
                    .value()
                    .attr(&self.schemas.link_attribute)
                    .and_then(|href| page_url.join(href).ok())
                else {
                    tracing::debug!("Article without link on {}", page_url);
                    continue;
                };

                let mut title = element_text(title_element);
                if title.is_empty() {
                    title = slug_title(&link).unwrap_or_default();
                }
                if title.is_empty() {
                    continue;
                }
                page.entries.push((title, link.to_string()));
            }
        }

        page.next_pages = self.pagination_links(&document, page_url);
        page
    }

    fn pagination_links(&self, document: &Html, page_url: &Url) -> Vec<Url> {
        let current = page_number(page_url, &self.pagination_pattern).unwrap_or(1);
        let mut links: Vec<(u32, Url)> = document
            .select(&self.schemas.anchor)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter_map(|href| page_url.join(href).ok())
            .filter(|link| link.host_str() == page_url.host_str())
            .filter_map(|link| {
                let number = page_number(&link, &self.pagination_pattern)?;
                (number > current).then_some((number, link))
            })
            .collect();

        links.sort_by_key(|(number, _)| *number);
        links.dedup_by_key(|(number, _)| *number);
        links.into_iter().map(|(_, link)| link).collect()
    }

    /// Extract the transcript block from an article page
    pub fn parse_transcript(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let blocks: Vec<String> = document
            .select(&self.schemas.page_base)
            .flat_map(|base| {
                base.select(&self.schemas.transcript)
                    .map(element_text)
                    .collect::<Vec<_>>()
            })
            .filter(|text| !text.is_empty())
            .collect();

        (!blocks.is_empty()).then(|| blocks.join(" "))
    }
}

#[async_trait]
impl CatalogSource for BlogExtractor {
    async fn enumerate(&self, collection: &Collection) -> Result<Vec<Item>> {
        let start = Url::parse(&collection.source_url)
            .with_context(|| format!("Invalid blog URL: {}", collection.source_url))?;
        let mut frontier =
            CrawlFrontier::new(start, &self.pagination_pattern, self.max_depth, self.max_pages);
        let mut entries = Vec::new();

        while let Some((page_url, depth)) = frontier.next_page() {
            let html = match self.http.get_text(page_url.as_str()).await {
                Ok(html) => html,
                Err(e) if frontier.visited() == 1 => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping listing page {}: {:#}", page_url, e);
                    continue;
                }
            };

            let page = self.parse_listing(&html, &page_url);
            tracing::debug!(
                "{}: {} articles, {} further pages",
                page_url,
                page.entries.len(),
                page.next_pages.len()
            );
            entries.extend(page.entries);
            frontier.extend(depth, page.next_pages);
        }

        tracing::info!(
            "Crawled {} listing pages of '{}', found {} articles",
            frontier.visited(),
            collection.name,
            entries.len()
        );

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(idx, (title, link))| {
                Item::new(ContentKind::Blog, collection, idx + 1, link, title)
            })
            .collect())
    }

    fn platform_name(&self) -> &'static str {
        "Blog"
    }
}

#[async_trait]
impl TranscriptSource for BlogExtractor {
    async fn fetch_transcript(&self, item: &Item) -> Result<String> {
        let html = self.http.get_text(&item.url).await?;
        self.parse_transcript(&html)
            .with_context(|| format!("No transcript text found at {}", item.url))
    }
}
