use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::ops::ControlFlow;
use std::path::Path;

use tracing::debug;

use super::{ArchiveEntry, ArchiveError, EntrySource, Visitor, natural_cmp};

/// A zip/cbz container. Entries are visited in natural name order.
pub struct ZipSource<R: Read + Seek = BufReader<File>> {
    archive: ::zip::ZipArchive<R>,
    /// `(name, index)` of file entries, sorted.
    order: Vec<(String, usize)>,
}

impl ZipSource {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn from_reader(reader: R) -> Result<Self, ArchiveError> {
        let archive = ::zip::ZipArchive::new(reader)?;
        // file_names() does not follow index order, so look each one up.
        let mut order: Vec<(String, usize)> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .filter_map(|name| archive.index_for_name(name).map(|i| (name.to_string(), i)))
            .collect();
        order.sort_by(|a, b| natural_cmp(&a.0, &b.0));
        Ok(Self { archive, order })
    }

    /// Reorder entries so that `names()` and `visit()` follow `ordered`.
    pub(super) fn set_order(&mut self, ordered: &[String]) {
        let mut reordered = Vec::with_capacity(self.order.len());
        for name in ordered {
            if let Some(pos) = self.order.iter().position(|(n, _)| n == name) {
                reordered.push(self.order.remove(pos));
            }
        }
        reordered.append(&mut self.order);
        self.order = reordered;
    }
}

impl<R: Read + Seek + Send> EntrySource for ZipSource<R> {
    fn names(&mut self) -> Result<Vec<String>, ArchiveError> {
        Ok(self.order.iter().map(|(n, _)| n.clone()).collect())
    }

    fn visit(&mut self, visit: &mut Visitor<'_>) -> Result<(), ArchiveError> {
        for (name, index) in &self.order {
            let mut file = match self.archive.by_index(*index) {
                Ok(f) => f,
                Err(e) => {
                    debug!("Skipping unreadable zip entry {name}: {e}");
                    continue;
                }
            };
            if file.is_dir() {
                continue;
            }
            let flow = visit(ArchiveEntry {
                name,
                reader: &mut file,
            })?;
            if flow == ControlFlow::Break(()) {
                break;
            }
        }
        Ok(())
    }
}
