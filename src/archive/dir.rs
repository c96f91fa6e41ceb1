use std::fs::File;
use std::io::BufReader;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{ArchiveEntry, ArchiveError, EntrySource, Visitor, natural_cmp};

/// A folder of loose page images, read recursively.
pub struct DirSource {
    root: PathBuf,
    /// `/`-separated paths relative to `root`, naturally sorted.
    entries: Vec<String>,
}

impl DirSource {
    pub fn new(root: &Path) -> Result<Self, ArchiveError> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| ArchiveError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(name);
        }
        entries.sort_by(|a, b| natural_cmp(a, b));
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }
}

impl EntrySource for DirSource {
    fn names(&mut self) -> Result<Vec<String>, ArchiveError> {
        Ok(self.entries.clone())
    }

    fn visit(&mut self, visit: &mut Visitor<'_>) -> Result<(), ArchiveError> {
        for name in &self.entries {
            let mut reader = BufReader::new(File::open(self.root.join(name))?);
            if visit(ArchiveEntry {
                name,
                reader: &mut reader,
            })? == ControlFlow::Break(())
            {
                break;
            }
        }
        Ok(())
    }

    fn read(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        if !self.entries.iter().any(|e| e == name) {
            return Err(ArchiveError::EntryNotFound(name.to_string()));
        }
        Ok(std::fs::read(self.root.join(name))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{middle_image, tests::png_bytes};

    #[test]
    fn test_dir_source_lists_nested_files_in_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("part 2")).unwrap();
        std::fs::write(dir.path().join("10.png"), png_bytes(1, 1)).unwrap();
        std::fs::write(dir.path().join("9.png"), png_bytes(1, 1)).unwrap();
        std::fs::write(dir.path().join("part 2/1.png"), png_bytes(4, 4)).unwrap();

        let mut source = DirSource::new(dir.path()).unwrap();
        assert_eq!(source.names().unwrap(), vec!["9.png", "10.png", "part 2/1.png"]);
        assert_eq!(source.read("part 2/1.png").unwrap(), png_bytes(4, 4));
        assert!(matches!(
            source.read("../outside.png"),
            Err(ArchiveError::EntryNotFound(_))
        ));
        let (middle, _) = middle_image(&mut source).unwrap();
        assert_eq!(middle, "10.png");
    }
}
