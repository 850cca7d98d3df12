//! File-backed `NewsFetcher`. The real scraping layer lives outside this
//! system; this implementation reads a dropped-off evidence feed (one JSON
//! file per topic directory, or a single shared file) so the pipeline can
//! run against scraper output or replay captures.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use radar_common::{EvidenceItem, SourceCategory};

use crate::traits::NewsFetcher;

/// On-disk evidence record. `source` is a free string, coerced leniently.
#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "content")]
    body: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

/// Either a bare array of items or `{"items": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedFile {
    Items(Vec<FeedItem>),
    Wrapped { items: Vec<FeedItem> },
}

pub struct JsonFeedFetcher {
    path: PathBuf,
}

impl JsonFeedFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Prefer a per-topic file next to the configured one, fall back to
    /// the shared feed file.
    fn path_for(&self, topic: &str) -> PathBuf {
        let candidate = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{topic}.json"));
        if candidate.exists() {
            candidate
        } else {
            self.path.clone()
        }
    }
}

#[async_trait]
impl NewsFetcher for JsonFeedFetcher {
    async fn fetch(&self, topic: &str) -> Result<Vec<EvidenceItem>> {
        let path = self.path_for(topic);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading evidence feed {}", path.display()))?;
        let parsed: FeedFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing evidence feed {}", path.display()))?;

        let items = match parsed {
            FeedFile::Items(items) | FeedFile::Wrapped { items } => items,
        };
        let items: Vec<EvidenceItem> = items
            .into_iter()
            .map(|item| EvidenceItem {
                title: item.title,
                body: item.body,
                source: SourceCategory::parse_lenient(&item.source),
                url: item.url,
                published_at: item.published_at,
            })
            .collect();

        info!(topic, path = %path.display(), count = items.len(), "Loaded evidence feed");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_bare_array_with_lenient_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(
            &path,
            r#"[{"title": "t", "content": "b", "source": "blog", "url": "https://x"}]"#,
        )
        .unwrap();

        let fetcher = JsonFeedFetcher::new(&path);
        let items = fetcher.fetch("semis").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].body, "b");
        assert_eq!(items[0].source, SourceCategory::Media);
    }

    #[tokio::test]
    async fn prefers_per_topic_file() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("feed.json");
        std::fs::write(&shared, r#"{"items": []}"#).unwrap();
        std::fs::write(
            dir.path().join("semis.json"),
            r#"{"items": [{"title": "t", "body": "b", "source": "official"}]}"#,
        )
        .unwrap();

        let fetcher = JsonFeedFetcher::new(&shared);
        let items = fetcher.fetch("semis").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, SourceCategory::Official);
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_error() {
        let fetcher = JsonFeedFetcher::new("/nonexistent/feed.json");
        assert!(fetcher.fetch("semis").await.is_err());
    }
}
