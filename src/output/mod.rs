//! Partitioned dataset, reports, and the sink they are handed to.

mod partition;
mod reports;

pub use partition::{
    partition, PartitionKey, PartitionWriter, WriteSummary, BOT_DETAILS_KEY, BOT_SUMMARY_KEY, ERROR_REPORT_KEY,
    HOURLY_KEY, UNKNOWN_COUNTRY,
};
pub use reports::{bot_summary, error_report, hourly_aggregate, BotOriginRow, ErrorReportRow, HourlyAggregateRow};

use crate::error::{EtlError, Result};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for one named table. The key is a relative, `/`-separated name.
pub trait OutputSink {
    fn write<T: Serialize>(&self, key: &str, rows: &[T]) -> Result<()>;
}

/// Writes `{root}/{key}.jsonl`, one JSON object per line.
pub struct JsonLinesSink {
    root: PathBuf,
}

impl JsonLinesSink {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut p = self.root.clone();
        for part in key.split('/').filter(|s| !s.is_empty()) {
            p.push(part);
        }
        p.set_extension("jsonl");
        p
    }
}

impl OutputSink for JsonLinesSink {
    fn write<T: Serialize>(&self, key: &str, rows: &[T]) -> Result<()> {
        let path = self.path_for(key);
        let dir = path
            .parent()
            .ok_or_else(|| EtlError::Sink(format!("no parent directory for {key}")))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file_mut());
            for row in rows {
                serde_json::to_writer(&mut w, row)?;
                w.write_all(b"\n")?;
            }
            w.flush()?;
        }
        tmp.persist(&path).map_err(|e| EtlError::Sink(e.to_string()))?;
        Ok(())
    }
}
