use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub covers: CoversConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Libraries seeded into the catalog at startup.
    #[serde(default)]
    pub libraries: Vec<LibrarySeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoversConfig {
    #[serde(default = "default_covers_path", alias = "covers_dir")]
    pub cache_path: PathBuf,
    /// Path prefix under which cached posters are served.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default = "default_poster_width")]
    pub poster_width: u32,
    #[serde(default = "default_poster_height")]
    pub poster_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Render a preview thumbnail for each new chapter.
    #[serde(default = "default_true")]
    pub previews: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metadata_base_url")]
    pub base_url: String,
    #[serde(default = "default_cover_base_url")]
    pub cover_base_url: String,
    /// Upper bound for every provider request, including cover downloads.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Cron expression used when a library has no schedule of its own.
    #[serde(default = "default_schedule")]
    pub default_schedule: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibrarySeed {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub description: String,
}

const DEFAULT_POSTER_WIDTH: u32 = 400;
const DEFAULT_POSTER_HEIGHT: u32 = 600;
const DEFAULT_COVER_QUALITY: u8 = 85;

/// Validated poster settings (target dimensions and JPEG quality).
#[derive(Debug, Clone, Copy)]
pub struct CoverImageConfig {
    width: u32,
    height: u32,
    jpeg_quality: u8,
}

impl CoverImageConfig {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        let (width, height) = if width == 0 || height == 0 {
            (DEFAULT_POSTER_WIDTH, DEFAULT_POSTER_HEIGHT)
        } else {
            (width, height)
        };
        let jpeg_quality = if (1..=100).contains(&quality) {
            quality
        } else {
            DEFAULT_COVER_QUALITY
        };
        Self {
            width,
            height,
            jpeg_quality,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Height divided by width of the target poster.
    pub fn aspect(&self) -> f64 {
        self.height as f64 / self.width as f64
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}

impl Default for CoverImageConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POSTER_WIDTH, DEFAULT_POSTER_HEIGHT, DEFAULT_COVER_QUALITY)
    }
}

impl From<&CoversConfig> for CoverImageConfig {
    fn from(cfg: &CoversConfig) -> Self {
        Self::new(cfg.poster_width, cfg.poster_height, cfg.jpeg_quality)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

// Default value functions

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_url() -> String {
    "sqlite://mangaindex.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_covers_path() -> PathBuf {
    PathBuf::from("covers")
}

fn default_url_prefix() -> String {
    "/api/posters".to_string()
}

fn default_poster_width() -> u32 {
    DEFAULT_POSTER_WIDTH
}

fn default_poster_height() -> u32 {
    DEFAULT_POSTER_HEIGHT
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_COVER_QUALITY
}

fn default_metadata_base_url() -> String {
    "https://api.mangadex.org".to_string()
}

fn default_cover_base_url() -> String {
    "https://uploads.mangadex.org".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_schedule() -> String {
    "0 */6 * * *".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

impl Default for CoversConfig {
    fn default() -> Self {
        Self {
            cache_path: default_covers_path(),
            url_prefix: default_url_prefix(),
            poster_width: default_poster_width(),
            poster_height: default_poster_height(),
            jpeg_quality: default_jpeg_quality(),
            previews: true,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_metadata_base_url(),
            cover_base_url: default_cover_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            default_schedule: default_schedule(),
        }
    }
}
