//! Read-only access to the pages of a chapter container.
//!
//! Every supported container (zip/cbz, rar/cbr, epub, or a plain directory)
//! is exposed through [`EntrySource`]: an ordered sequence of named, readable
//! entries. [`open`] picks the implementation from the path, so callers never
//! branch on the format themselves.

mod dir;
mod epub;
#[cfg(feature = "rar")]
mod rar;
pub mod safety;
mod zip;

use std::cmp::Ordering;
use std::fs::File;
use std::io::Read;
use std::ops::ControlFlow;
use std::path::Path;

pub use dir::DirSource;
pub use epub::EpubSource;
#[cfg(feature = "rar")]
pub use rar::RarSource;
pub use safety::{ExtractReport, extract_all, safe_join, validate_entry_name};
pub use self::zip::ZipSource;

/// Extensions recognised as page images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "avif"];

/// Extensions of single-file chapter containers.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["cbz", "cbr", "zip", "rar", "epub"];

/// One entry handed to an [`EntrySource::visit`] callback.
pub struct ArchiveEntry<'a> {
    /// Entry name with `/` separators, relative to the container root.
    pub name: &'a str,
    pub reader: &'a mut dyn Read,
}

pub type Visitor<'v> = dyn FnMut(ArchiveEntry<'_>) -> Result<ControlFlow<()>, ArchiveError> + 'v;

/// Uniform, lazy iteration over the files of a container.
pub trait EntrySource: Send {
    /// File entry names in the source's preferred order.
    fn names(&mut self) -> Result<Vec<String>, ArchiveError>;

    /// Hand entries to `visit` one at a time until it breaks or entries run
    /// out. Entries are opened only when reached.
    fn visit(&mut self, visit: &mut Visitor<'_>) -> Result<(), ArchiveError>;

    /// Read a single entry fully into memory.
    fn read(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut found = None;
        self.visit(&mut |entry| {
            if entry.name != name {
                return Ok(ControlFlow::Continue(()));
            }
            let mut data = Vec::new();
            entry.reader.read_to_end(&mut data)?;
            found = Some(data);
            Ok(ControlFlow::Break(()))
        })?;
        found.ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Directory,
    Zip,
    Rar,
    Epub,
}

impl Format {
    /// Decide the container format from the path, trusting file magic over
    /// the extension for zip/rar lookalikes (`.cbr` files are often zips).
    pub fn detect(path: &Path) -> Result<Format, ArchiveError> {
        if path.is_dir() {
            return Ok(Format::Directory);
        }
        let ext = lower_extension(path);
        let by_ext = match ext.as_str() {
            "epub" => return Ok(Format::Epub),
            "zip" | "cbz" => Format::Zip,
            "rar" | "cbr" => Format::Rar,
            _ => return Err(ArchiveError::Unsupported(path.display().to_string())),
        };
        Ok(sniff_magic(path).unwrap_or(by_ext))
    }
}

fn sniff_magic(path: &Path) -> Option<Format> {
    let mut head = [0u8; 4];
    let mut file = File::open(path).ok()?;
    file.read_exact(&mut head).ok()?;
    match &head {
        b"PK\x03\x04" => Some(Format::Zip),
        b"Rar!" => Some(Format::Rar),
        _ => None,
    }
}

/// Open a container (or directory) for reading.
pub fn open(path: &Path) -> Result<Box<dyn EntrySource>, ArchiveError> {
    match Format::detect(path)? {
        Format::Directory => Ok(Box::new(DirSource::new(path)?)),
        Format::Zip => Ok(Box::new(ZipSource::open(path)?)),
        Format::Epub => Ok(Box::new(EpubSource::open(path)?)),
        #[cfg(feature = "rar")]
        Format::Rar => Ok(Box::new(RarSource::open(path)?)),
        #[cfg(not(feature = "rar"))]
        Format::Rar => Err(ArchiveError::Unsupported(format!(
            "{} (built without rar support)",
            path.display()
        ))),
    }
}

/// Names of image entries, in source order.
pub fn image_names(source: &mut dyn EntrySource) -> Result<Vec<String>, ArchiveError> {
    Ok(source
        .names()?
        .into_iter()
        .filter(|n| is_image_name(n))
        .collect())
}

/// The first image of the source as `(entry name, bytes)`.
pub fn first_image(source: &mut dyn EntrySource) -> Result<(String, Vec<u8>), ArchiveError> {
    let name = image_names(source)?
        .into_iter()
        .next()
        .ok_or(ArchiveError::NoImages)?;
    let data = source.read(&name)?;
    Ok((name, data))
}

/// The image in the middle of the page order; title pages skew the first one.
pub fn middle_image(source: &mut dyn EntrySource) -> Result<(String, Vec<u8>), ArchiveError> {
    let mut names = image_names(source)?;
    if names.is_empty() {
        return Err(ArchiveError::NoImages);
    }
    let name = names.swap_remove(names.len() / 2);
    let data = source.read(&name)?;
    Ok((name, data))
}

pub fn is_image_name(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    if file_name.starts_with('.') {
        return false;
    }
    IMAGE_EXTENSIONS.contains(&lower_extension(Path::new(file_name)).as_str())
}

pub fn is_archive_path(path: &Path) -> bool {
    ARCHIVE_EXTENSIONS.contains(&lower_extension(path).as_str())
}

pub fn is_epub_path(path: &Path) -> bool {
    lower_extension(path) == "epub"
}

pub(crate) fn lower_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Compare names so that `page2` sorts before `page10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let xs = take_digits(&mut ai);
                let ys = take_digits(&mut bi);
                let xt = xs.trim_start_matches('0');
                let yt = ys.trim_start_matches('0');
                let ord = xt.len().cmp(&yt.len()).then_with(|| xt.cmp(yt));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_lowercase().cmp(y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = it.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        out.push(c);
        it.next();
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] ::zip::result::ZipError),
    #[error("RAR error: {0}")]
    Rar(String),
    #[error("corrupt archive: {0}")]
    Corrupt(String),
    #[error("unsupported container: {0}")]
    Unsupported(String),
    #[error("no image entries found")]
    NoImages,
    #[error("entry not found: {0}")]
    EntryNotFound(String),
    #[error("unsafe entry name: {0}")]
    UnsafeEntry(String),
}

impl ArchiveError {
    /// The container itself could not be read.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            ArchiveError::Zip(_) | ArchiveError::Rar(_) | ArchiveError::Corrupt(_)
        )
    }
}
