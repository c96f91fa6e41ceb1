use std::io::Cursor;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use unrar::Archive;

use super::{ArchiveEntry, ArchiveError, EntrySource, Visitor, natural_cmp};

/// A rar/cbr container, read through libunrar.
///
/// RAR only supports forward processing, so `visit` walks the archive in
/// stored order and hands entries over in natural name order by buffering
/// the ones that arrive early.
pub struct RarSource {
    path: PathBuf,
    names: Vec<String>,
}

impl RarSource {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let listing = Archive::new(path)
            .open_for_listing()
            .map_err(|e| ArchiveError::Rar(e.to_string()))?;
        let mut names = Vec::new();
        for header in listing {
            let header = header.map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
            if header.is_file() {
                names.push(entry_name(&header.filename));
            }
        }
        names.sort_by(|a, b| natural_cmp(a, b));
        Ok(Self {
            path: path.to_path_buf(),
            names,
        })
    }
}

fn entry_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

impl EntrySource for RarSource {
    fn names(&mut self) -> Result<Vec<String>, ArchiveError> {
        Ok(self.names.clone())
    }

    fn visit(&mut self, visit: &mut Visitor<'_>) -> Result<(), ArchiveError> {
        let mut pending: Vec<Option<Vec<u8>>> = vec![None; self.names.len()];
        let mut next = 0;

        let mut archive = Archive::new(&self.path)
            .open_for_processing()
            .map_err(|e| ArchiveError::Rar(e.to_string()))?;
        while next < self.names.len() {
            let Some(header) = archive
                .read_header()
                .map_err(|e| ArchiveError::Corrupt(e.to_string()))?
            else {
                break;
            };
            let name = entry_name(&header.entry().filename);
            let slot = if header.entry().is_file() {
                self.names.iter().position(|n| *n == name)
            } else {
                None
            };
            archive = match slot {
                Some(index) => {
                    let (data, rest) = header
                        .read()
                        .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
                    pending[index] = Some(data);
                    rest
                }
                None => header
                    .skip()
                    .map_err(|e| ArchiveError::Corrupt(e.to_string()))?,
            };

            while next < self.names.len() {
                let Some(data) = pending[next].take() else {
                    break;
                };
                let flow = visit(ArchiveEntry {
                    name: &self.names[next],
                    reader: &mut Cursor::new(data),
                })?;
                next += 1;
                if flow == ControlFlow::Break(()) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn read(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut archive = Archive::new(&self.path)
            .open_for_processing()
            .map_err(|e| ArchiveError::Rar(e.to_string()))?;
        while let Some(header) = archive
            .read_header()
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?
        {
            if header.entry().is_file() && entry_name(&header.entry().filename) == name {
                let (data, _) = header
                    .read()
                    .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
                return Ok(data);
            }
            archive = header
                .skip()
                .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        }
        Err(ArchiveError::EntryNotFound(name.to_string()))
    }
}
