//! Log files under a local directory, plain or gzip-compressed.

use super::LogSource;
use crate::error::{EtlError, Result};
use flate2::read::MultiGzDecoder;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MAX_DEPTH: usize = 16;

pub struct LocalDirSource {
    root: PathBuf,
    suffix: String,
}

impl LocalDirSource {
    pub fn new(root: &Path, suffix: impl Into<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            suffix: suffix.into(),
        }
    }

    fn resolve(&self, source_id: &str) -> PathBuf {
        self.root.join(source_id)
    }
}

/// Split raw bytes into trimmed, non-empty lines. Invalid UTF-8 is replaced.
fn lines_of(reader: impl Read) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut buf = Vec::new();
    let mut reader = BufReader::new(reader);
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if !line.is_empty() {
            out.push(line.to_string());
        }
    }
    Ok(out)
}

impl LogSource for LocalDirSource {
    /// Relative paths of matching files, sorted.
    fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(EtlError::Source(format!("{} is not a directory", self.root.display())));
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root)
            .max_depth(MAX_DEPTH)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.path().to_string_lossy();
            if !name.ends_with(&self.suffix) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                keys.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn read(&self, source_id: &str) -> Result<Vec<String>> {
        let path = self.resolve(source_id);
        let file = std::fs::File::open(&path)?;
        if source_id.ends_with(".gz") {
            lines_of(MultiGzDecoder::new(file))
        } else {
            lines_of(file)
        }
    }
}
