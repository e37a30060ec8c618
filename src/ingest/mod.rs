//! Log sources: enumerate source keys and read their lines.

mod local;

pub use local::LocalDirSource;

use crate::error::Result;

/// Input collaborator. `read` returns decompressed text lines of one source.
pub trait LogSource: Sync {
    fn list(&self) -> Result<Vec<String>>;
    fn read(&self, source_id: &str) -> Result<Vec<String>>;
}

/// Fixed in-memory sources, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    sources: Vec<(String, Vec<String>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source_id: impl Into<String>, lines: Vec<String>) -> Self {
        self.sources.push((source_id.into(), lines));
        self
    }
}

impl LogSource for MemorySource {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.sources.iter().map(|(id, _)| id.clone()).collect())
    }

    fn read(&self, source_id: &str) -> Result<Vec<String>> {
        self.sources
            .iter()
            .find(|(id, _)| id == source_id)
            .map(|(_, lines)| lines.clone())
            .ok_or_else(|| crate::error::EtlError::Source(format!("unknown source {source_id}")))
    }
}
