//! Name cleaning, slugs and chapter naming.
//!
//! Everything here is a pure function of its input: the same folder or file
//! name always cleans to the same title and slug.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::archive::is_archive_path;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").expect("bracket regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Release-format words that trail a name, e.g. `Title Digital HQ`.
static FORMAT_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\s\-.]+(digital|webrip|web|scan|scans|hq|lq|colou?red|color|complete|raw|cbz|cbr|epub)$")
        .expect("format marker regex")
});

/// A volume or chapter marker and everything after it.
static VOLUME_CHAPTER_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[\s\-.]*\b(?:v|vol|vols|volume|volumes|c|ch|chap|chapter|chapters)\.?\s*\d+(?:\.\d+)?\b.*$",
    )
    .expect("volume/chapter regex")
});

/// A bare trailing `001-050` style range.
static TRAILING_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-]+\d+\s*-\s*\d+\s*$").expect("range regex"));

static VOLUME_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:v|vol|volume)\.?\s*(\d+(?:\.\d+)?)").expect("volume number regex")
});

static CHAPTER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:c|ch|chap|chapter|ep|episode)\.?\s*(\d+(?:\.\d+)?)")
        .expect("chapter number regex")
});

static PURELY_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?$").expect("numeric regex"));

/// Base name used for cleaning: the directory name, or the file name
/// without its extension for chapter containers.
pub fn display_name(path: &Path) -> String {
    let stem = if path.is_dir() || !is_archive_path(path) {
        path.file_name()
    } else {
        path.file_stem()
    };
    stem.map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Strip tags and release-format noise but keep numbering.
///
/// Used for chapter detection: the result of `"Ch. 12 [Group] (Digital)"` is
/// `"Ch. 12"`.
pub fn clean_name(raw: &str) -> String {
    let spaced = raw.replace('_', " ");
    let untagged = BRACKETED.replace_all(&spaced, " ");
    let mut name = WHITESPACE.replace_all(untagged.trim(), " ").into_owned();
    loop {
        let stripped = FORMAT_MARKERS.replace(&name, "").trim().to_string();
        if stripped == name {
            break;
        }
        name = stripped;
    }
    name.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace())
        .to_string()
}

/// Clean a media folder or file name into its title: tags, volume and
/// chapter ranges and format markers are all removed.
pub fn clean_title(raw: &str) -> String {
    let name = clean_name(raw);
    let name = VOLUME_CHAPTER_NOISE.replace(&name, "");
    let name = TRAILING_RANGE.replace(&name, "");
    name.trim_matches(|c: char| c == '-' || c == '.' || c == ',' || c.is_whitespace())
        .to_string()
}

/// URL-safe lowercase identifier. Runs of anything that is not a letter or
/// digit collapse into a single `-`; apostrophes vanish.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch == '\'' || ch == '\u{2019}' {
            continue;
        }
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Slug for a media folder/file name; empty when nothing survives cleaning.
pub fn media_slug(raw: &str) -> String {
    slugify(&clean_title(raw))
}

/// Whether a name counts as a chapter candidate.
pub fn is_chapter_like(raw: &str) -> bool {
    clean_name(raw).chars().any(|c| c.is_ascii_digit())
}

/// Human-readable chapter name derived from a file or folder name.
///
/// Volume and chapter numbers win when present; otherwise the cleaned name
/// is used, and a bare number becomes `Chapter N`.
pub fn chapter_name(raw: &str) -> String {
    let cleaned = clean_name(raw);
    let volume = VOLUME_NUMBER
        .captures(&cleaned)
        .map(|c| normalize_number(&c[1]));
    let chapter = CHAPTER_NUMBER
        .captures(&cleaned)
        .map(|c| normalize_number(&c[1]));

    match (volume, chapter) {
        (Some(v), Some(c)) => format!("Volume {v} Chapter {c}"),
        (None, Some(c)) => format!("Chapter {c}"),
        (Some(v), None) => format!("Volume {v}"),
        (None, None) if PURELY_NUMERIC.is_match(&cleaned) => {
            format!("Chapter {}", normalize_number(&cleaned))
        }
        (None, None) => cleaned,
    }
}

/// Drop leading zeros: `007` becomes `7`, `000` becomes `0`, `010.5` becomes
/// `10.5`.
fn normalize_number(n: &str) -> String {
    let (int, frac) = match n.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (n, None),
    };
    let int = int.trim_start_matches('0');
    let int = if int.is_empty() { "0" } else { int };
    match frac {
        Some(f) => format!("{int}.{f}"),
        None => int.to_string(),
    }
}
