//! Entry-name validation for anything written to disk from a container.

use std::fs;
use std::io;
use std::ops::ControlFlow;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use super::{ArchiveError, EntrySource};

/// Validate an entry name and return it as a relative path.
///
/// Backslashes are treated as separators. Absolute names, drive prefixes,
/// NUL bytes and any `..` segment are rejected outright, even when the
/// traversal would stay inside the root.
pub fn validate_entry_name(name: &str) -> Result<PathBuf, ArchiveError> {
    let unsafe_entry = || ArchiveError::UnsafeEntry(name.to_string());

    if name.contains('\0') {
        return Err(unsafe_entry());
    }
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(unsafe_entry());
    }

    let mut out = PathBuf::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(unsafe_entry()),
            s => out.push(s),
        }
    }

    // The rebuilt path must consist of normal components only.
    if out.as_os_str().is_empty()
        || out
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(unsafe_entry());
    }
    Ok(out)
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Join a validated entry name onto `dest`, refusing anything that would not
/// land strictly inside it.
pub fn safe_join(dest: &Path, name: &str) -> Result<PathBuf, ArchiveError> {
    let relative = validate_entry_name(name)?;
    let target = dest.join(relative);
    if target == dest || !target.starts_with(dest) {
        return Err(ArchiveError::UnsafeEntry(name.to_string()));
    }
    Ok(target)
}

/// Outcome of [`extract_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

/// Extract every entry of `source` below `dest`.
///
/// Entries with unsafe names are skipped and reported; they never abort the
/// rest of the extraction.
pub fn extract_all(source: &mut dyn EntrySource, dest: &Path) -> Result<ExtractReport, ArchiveError> {
    fs::create_dir_all(dest)?;
    let root = dest.canonicalize()?;
    let mut report = ExtractReport::default();

    source.visit(&mut |entry| {
        let target = match safe_join(&root, entry.name) {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping archive entry: {e}");
                report.skipped.push(entry.name.to_string());
                return Ok(ControlFlow::Continue(()));
            }
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
            // A symlinked directory inside `dest` could still point elsewhere.
            if !parent.canonicalize()?.starts_with(&root) {
                warn!("Skipping archive entry {}: escapes destination", entry.name);
                report.skipped.push(entry.name.to_string());
                return Ok(ControlFlow::Continue(()));
            }
        }

        let mut out = fs::File::create(&target)?;
        io::copy(entry.reader, &mut out)?;
        debug!("Extracted {}", target.display());
        report.written.push(target);
        Ok(ControlFlow::Continue(()))
    })?;

    Ok(report)
}
