//! External title metadata.

mod mangadex;

use async_trait::async_trait;

use crate::config::MetadataConfig;
use crate::db::models::MediaType;

pub use mangadex::MangaDexProvider;

/// Everything a provider may know about a title. All fields are optional
/// in practice; empty strings mean "unknown".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub provider_id: String,
    pub title: String,
    pub alt_titles: Vec<String>,
    pub description: String,
    pub year: Option<i64>,
    pub original_language: String,
    pub status: String,
    pub content_rating: String,
    pub author: String,
    pub tags: Vec<String>,
    pub media_type: Option<MediaType>,
    pub cover_url: Option<String>,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Best match for an already cleaned title, if any.
    async fn find_best_match(&self, cleaned_name: &str) -> Result<Option<MediaMetadata>, MetadataError>;

    fn cover_image_url(&self, metadata: &MediaMetadata) -> Option<String> {
        metadata.cover_url.clone().filter(|u| !u.is_empty())
    }
}

/// Never finds anything; used when lookups are switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProvider;

#[async_trait]
impl MetadataProvider for DisabledProvider {
    async fn find_best_match(&self, _: &str) -> Result<Option<MediaMetadata>, MetadataError> {
        Ok(None)
    }
}

/// Build the provider selected by configuration.
pub fn from_config(config: &MetadataConfig) -> Result<Box<dyn MetadataProvider>, MetadataError> {
    if !config.enabled {
        return Ok(Box::new(DisabledProvider));
    }
    Ok(Box::new(MangaDexProvider::new(config)?))
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected provider response: {0}")]
    Response(String),
}
