use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{MediaMetadata, MetadataError, MetadataProvider};
use crate::config::MetadataConfig;
use crate::db::models::MediaType;
use crate::scanner::naming::slugify;

/// MangaDex asks clients to stay well under 5 requests per second.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(250);

const SEARCH_LIMIT: &str = "10";

/// Client for the public MangaDex API.
pub struct MangaDexProvider {
    client: reqwest::Client,
    base_url: String,
    cover_base_url: String,
    last_request: Arc<Mutex<Instant>>,
}

// === API response types ===

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<MangaData>,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: Localized,
    #[serde(default)]
    alt_titles: Vec<Localized>,
    #[serde(default)]
    description: Localized,
    year: Option<i64>,
    #[serde(default)]
    original_language: String,
    status: Option<String>,
    content_rating: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

/// Localised strings. MangaDex sends `[]` instead of `{}` when empty.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum Localized {
    Map(HashMap<String, String>),
    Empty(#[allow(dead_code)] Vec<serde_json::Value>),
    #[default]
    Missing,
}

impl Localized {
    /// English first, then romanised Japanese, then anything.
    fn best(&self) -> Option<&str> {
        let Localized::Map(map) = self else {
            return None;
        };
        ["en", "ja-ro", "ja"]
            .iter()
            .find_map(|lang| map.get(*lang))
            .or_else(|| map.values().next())
            .map(String::as_str)
    }

    fn values(&self) -> impl Iterator<Item = &str> {
        let map = match self {
            Localized::Map(map) => Some(map),
            _ => None,
        };
        map.into_iter().flat_map(|m| m.values().map(String::as_str))
    }
}

#[derive(Debug, Deserialize)]
struct Tag {
    attributes: TagAttributes,
}

#[derive(Debug, Deserialize)]
struct TagAttributes {
    #[serde(default)]
    name: Localized,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationshipAttributes {
    name: Option<String>,
    file_name: Option<String>,
}

impl MangaDexProvider {
    pub fn new(config: &MetadataConfig) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("mangaindex/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cover_base_url: config.cover_base_url.trim_end_matches('/').to_string(),
            last_request: Arc::new(Mutex::new(
                Instant::now()
                    .checked_sub(MIN_REQUEST_INTERVAL)
                    .unwrap_or_else(Instant::now),
            )),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < MIN_REQUEST_INTERVAL {
            let wait = MIN_REQUEST_INTERVAL - elapsed;
            debug!("MangaDex rate limit: waiting {wait:?}");
            tokio::time::sleep(wait).await;
        }
        *last = Instant::now();
    }

    async fn search(&self, title: &str) -> Result<Vec<MangaData>, MetadataError> {
        self.rate_limit().await;
        let response = self
            .client
            .get(format!("{}/manga", self.base_url))
            .query(&[
                ("title", title),
                ("limit", SEARCH_LIMIT),
                ("includes[]", "cover_art"),
                ("includes[]", "author"),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| MetadataError::Response(e.to_string()))?;
        Ok(body.data)
    }

    fn to_metadata(&self, manga: MangaData) -> MediaMetadata {
        let attrs = &manga.attributes;
        let tags: Vec<String> = attrs
            .tags
            .iter()
            .filter_map(|t| t.attributes.name.best())
            .map(str::to_string)
            .collect();

        let media_type = if tags.iter().any(|t| t.eq_ignore_ascii_case("long strip")) {
            Some(MediaType::Webtoon)
        } else {
            match attrs.original_language.as_str() {
                "ko" => Some(MediaType::Manhwa),
                "zh" | "zh-hk" => Some(MediaType::Manhua),
                "ja" => Some(MediaType::Manga),
                _ => None,
            }
        };

        let author = related(&manga, "author")
            .filter_map(|a| a.name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        let cover_url = related(&manga, "cover_art")
            .find_map(|a| a.file_name.as_ref())
            .map(|file| format!("{}/covers/{}/{file}", self.cover_base_url, manga.id));

        MediaMetadata {
            provider_id: manga.id.clone(),
            title: attrs.title.best().unwrap_or_default().to_string(),
            alt_titles: attrs
                .alt_titles
                .iter()
                .flat_map(|t| t.values())
                .map(str::to_string)
                .collect(),
            description: attrs.description.best().unwrap_or_default().to_string(),
            year: attrs.year,
            original_language: attrs.original_language.clone(),
            status: attrs.status.clone().unwrap_or_default(),
            content_rating: attrs.content_rating.clone().unwrap_or_default(),
            author,
            tags,
            media_type,
            cover_url,
        }
    }
}

fn related<'a>(manga: &'a MangaData, kind: &'a str) -> impl Iterator<Item = &'a RelationshipAttributes> + 'a {
    manga
        .relationships
        .iter()
        .filter(move |r| r.kind == kind)
        .filter_map(|r| r.attributes.as_ref())
}

/// The result whose title or any alternative title slugifies to the same
/// slug as the query, else the first result.
fn pick_best(results: Vec<MangaData>, query_slug: &str) -> Option<MangaData> {
    let exact = results.iter().position(|m| {
        let attrs = &m.attributes;
        attrs
            .title
            .values()
            .chain(attrs.alt_titles.iter().flat_map(|t| t.values()))
            .any(|t| slugify(t) == query_slug)
    });
    let index = exact.unwrap_or(0);
    results.into_iter().nth(index)
}

#[async_trait]
impl MetadataProvider for MangaDexProvider {
    async fn find_best_match(&self, cleaned_name: &str) -> Result<Option<MediaMetadata>, MetadataError> {
        if cleaned_name.trim().is_empty() {
            return Ok(None);
        }
        let results = self.search(cleaned_name).await?;
        debug!("MangaDex: {} results for {cleaned_name:?}", results.len());
        Ok(pick_best(results, &slugify(cleaned_name)).map(|m| self.to_metadata(m)))
    }
}
