use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use url::Url;

use super::http::HttpFetcher;
use super::{CatalogSource, TranscriptSource};
use crate::config::Config;
use crate::model::{Collection, ContentKind, Item};
use crate::utils::{normalize_whitespace, with_backoff, AttemptError, RetryPolicy};
use crate::Result;

/// Playlist enumeration and caption retrieval using yt-dlp
pub struct YoutubeExtractor {
    yt_dlp_path: String,
    proxy: Option<String>,
    languages: Vec<String>,
    retry: RetryPolicy,
    http: HttpFetcher,
}

/// One entry of a flat playlist listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub position: usize,
    pub url: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Json3Captions {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(default)]
    segs: Vec<Json3Segment>,
}

#[derive(Debug, Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: String,
}

impl YoutubeExtractor {
    pub fn new(
        yt_dlp_path: impl Into<String>,
        proxy: Option<String>,
        languages: Vec<String>,
        retry: RetryPolicy,
        http: HttpFetcher,
    ) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            proxy,
            languages,
            retry,
            http,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let http = HttpFetcher::new(&config.fetch, config.video.proxy.as_deref())?;
        Ok(Self::new(
            config.video.yt_dlp_path.clone(),
            config.video.proxy.clone(),
            config.video.languages.clone(),
            config.fetch.retry,
            http,
        ))
    }

    /// Run yt-dlp and parse its JSON output, classifying rate-limit failures
    async fn run_yt_dlp(
        &self,
        flags: &'static [&'static str],
        url: &str,
    ) -> std::result::Result<Value, AttemptError> {
        let mut command = Command::new(&self.yt_dlp_path);
        command.args(flags).arg("--no-warnings");
        if let Some(proxy) = &self.proxy {
            command.arg("--proxy").arg(proxy);
        }
        command.arg(url);

        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.yt_dlp_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let failure = anyhow::anyhow!("yt-dlp failed: {}", error);
            return Err(if is_rate_limited(&error) {
                AttemptError::RateLimited(failure)
            } else {
                AttemptError::Permanent(failure)
            });
        }

        let value = serde_json::from_slice(&output.stdout).context("yt-dlp returned invalid JSON")?;
        Ok(value)
    }

    /// Get the flat playlist listing
    async fn playlist_info(&self, url: &str) -> Result<Value> {
        tracing::debug!("Listing playlist: {}", url);
        with_backoff(&self.retry, url, || {
            self.run_yt_dlp(&["--flat-playlist", "--dump-single-json"], url)
        })
        .await
    }

    /// Get video information using yt-dlp
    async fn video_info(&self, url: &str) -> Result<Value> {
        tracing::debug!("Extracting video info for: {}", url);
        with_backoff(&self.retry, url, || {
            self.run_yt_dlp(&["--dump-json", "--skip-download", "--no-playlist"], url)
        })
        .await
    }

    async fn resolve_title(&self, url: &str) -> Result<String> {
        let info = self.video_info(url).await?;
        info["title"]
            .as_str()
            .filter(|title| is_available_title(title))
            .map(str::to_string)
            .context("Video has no usable title")
    }
}

/// yt-dlp reports throttling through its error text
fn is_rate_limited(stderr: &str) -> bool {
    stderr.contains("HTTP Error 429")
        || stderr.contains("Too Many Requests")
        || stderr.contains("HTTP Error 503")
}

/// Placeholder titles used for videos that cannot be watched
fn is_available_title(title: &str) -> bool {
    let title = title.trim();
    !title.is_empty() && !matches!(title, "[Private video]" | "[Deleted video]")
}

/// Extract the video identifier from a watch, short or embed URL
pub fn video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    if host == "youtu.be" {
        return parsed.path_segments()?.next().filter(|s| !s.is_empty()).map(str::to_string);
    }
    if !host.ends_with("youtube.com") {
        return None;
    }
    if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
        return Some(id.into_owned());
    }
    let mut segments = parsed.path_segments()?;
    match segments.next()? {
        "embed" | "shorts" | "v" | "live" => {
            segments.next().filter(|s| !s.is_empty()).map(str::to_string)
        }
        _ => None,
    }
}

/// Entries of a flat playlist listing, with 1-based positions
pub fn parse_playlist_entries(info: &Value) -> Vec<PlaylistEntry> {
    let empty = vec![];
    let entries = info["entries"].as_array().unwrap_or(&empty);

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let url = entry["url"]
                .as_str()
                .filter(|url| url.starts_with("http"))
                .map(str::to_string)
                .or_else(|| {
                    entry["id"]
                        .as_str()
                        .map(|id| format!("https://www.youtube.com/watch?v={}", id))
                });
            let title = entry["title"]
                .as_str()
                .filter(|title| is_available_title(title))
                .map(str::to_string);
            PlaylistEntry {
                position: idx + 1,
                url,
                title,
            }
        })
        .collect()
}

/// Pick a json3 caption track: manual captions in preference order first,
/// then automatic ones
pub fn select_caption_url(info: &Value, languages: &[String]) -> Option<String> {
    for field in ["subtitles", "automatic_captions"] {
        let Some(tracks) = info[field].as_object() else {
            continue;
        };
        for language in languages {
            let exact = tracks.get(language.as_str());
            let regional = tracks
                .iter()
                .find(|(code, _)| code.starts_with(&format!("{}-", language)))
                .map(|(_, formats)| formats);

            for formats in exact.into_iter().chain(regional) {
                let url = formats.as_array().and_then(|formats| {
                    formats
                        .iter()
                        .find(|format| format["ext"] == "json3")
                        .and_then(|format| format["url"].as_str())
                });
                if let Some(url) = url {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}

/// Join the caption snippets of a json3 track into plain text
pub fn parse_json3(body: &str) -> Result<String> {
    let captions: Json3Captions = serde_json::from_str(body).context("Invalid caption track")?;
    let snippets: Vec<String> = captions
        .events
        .iter()
        .map(|event| {
            let text: String = event.segs.iter().map(|seg| seg.utf8.as_str()).collect();
            normalize_whitespace(&text)
        })
        .filter(|text| !text.is_empty())
        .collect();
    Ok(snippets.join(" "))
}

#[async_trait]
impl CatalogSource for YoutubeExtractor {
    async fn enumerate(&self, collection: &Collection) -> Result<Vec<Item>> {
        let info = self.playlist_info(&collection.source_url).await?;
        let entries = parse_playlist_entries(&info);
        let mut items = Vec::with_capacity(entries.len());

        for entry in entries {
            let Some(url) = entry.url else {
                tracing::warn!(
                    "Skipping entry {} of '{}': no URL",
                    entry.position,
                    collection.name
                );
                continue;
            };
            let title = match entry.title {
                Some(title) => title,
                None => match self.resolve_title(&url).await {
                    Ok(title) => title,
                    Err(e) => {
                        tracing::warn!("Skipping {} in '{}': {:#}", url, collection.name, e);
                        continue;
                    }
                },
            };
            items.push(Item::new(ContentKind::Video, collection, entry.position, url, title));
        }

        Ok(items)
    }

    fn platform_name(&self) -> &'static str {
        "YouTube"
    }
}

#[async_trait]
impl TranscriptSource for YoutubeExtractor {
    async fn fetch_transcript(&self, item: &Item) -> Result<String> {
        let id = video_id(&item.url).with_context(|| format!("No video id in {}", item.url))?;
        let info = self.video_info(&item.url).await?;

        let track = select_caption_url(&info, &self.languages).with_context(|| {
            format!("No captions for {} in {}", id, self.languages.join(", "))
        })?;
        let body = self.http.get_text(&track).await?;
        let text = parse_json3(&body)?;

        if text.is_empty() {
            anyhow::bail!("Caption track for {} is empty", id);
        }
        Ok(text)
    }
}
