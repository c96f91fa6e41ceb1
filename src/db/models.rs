use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct Library {
    pub slug: String,
    pub name: String,
    /// Root folders in scan order.
    #[sqlx(json)]
    pub folders: Vec<String>,
    /// Cron expression; empty means the configured default.
    pub schedule: String,
    pub description: String,
}

impl Library {
    pub fn folder_paths(&self) -> Vec<PathBuf> {
        self.folders.iter().map(PathBuf::from).collect()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Media {
    pub slug: String,
    pub library_slug: String,
    pub name: String,
    pub path: String,
    /// Chapter candidates seen on disk at the last reconciliation.
    pub file_count: i64,
    pub media_type: String,
    pub status: String,
    pub content_rating: String,
    pub cover_url: String,
    pub description: String,
    pub year: Option<i64>,
    pub original_language: String,
    pub author: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Column values for a media row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub slug: String,
    pub library_slug: String,
    pub name: String,
    pub path: String,
    pub media_type: MediaType,
    pub status: String,
    pub content_rating: String,
    pub cover_url: String,
    pub description: String,
    pub year: Option<i64>,
    pub original_language: String,
    pub author: String,
}

#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct Chapter {
    pub media_slug: String,
    pub slug: String,
    pub name: String,
    /// File location relative to the media folder it was found in.
    pub file: String,
}

#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct MediaDuplicate {
    pub id: i64,
    pub media_slug: String,
    pub library_slug: String,
    /// Always `<= folder_path2`.
    pub folder_path1: String,
    pub folder_path2: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Manga,
    Manhwa,
    Manhua,
    Webtoon,
    Comic,
    Novel,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Manga => "manga",
            MediaType::Manhwa => "manhwa",
            MediaType::Manhua => "manhua",
            MediaType::Webtoon => "webtoon",
            MediaType::Comic => "comic",
            MediaType::Novel => "novel",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manga" => Ok(MediaType::Manga),
            "manhwa" => Ok(MediaType::Manhwa),
            "manhua" => Ok(MediaType::Manhua),
            "webtoon" => Ok(MediaType::Webtoon),
            "comic" | "comics" => Ok(MediaType::Comic),
            "novel" | "light novel" | "light-novel" => Ok(MediaType::Novel),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

pub const STATUS_UNKNOWN: &str = "unknown";
pub const RATING_SAFE: &str = "safe";
