//! Primary dataset partitioning and the writer that drives every output.

use super::reports::{bot_summary, error_report, hourly_aggregate};
use super::OutputSink;
use crate::features::FeatureRecord;
use crate::logging::{report_degradation, Degradation};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Partition for records whose country is unknown.
pub const UNKNOWN_COUNTRY: &str = "UNK";

pub const HOURLY_KEY: &str = "aggregated_stats/hourly_traffic_by_geo";
pub const ERROR_REPORT_KEY: &str = "reports/error_summary_geo";
pub const BOT_DETAILS_KEY: &str = "reports/bot_traffic_details";
pub const BOT_SUMMARY_KEY: &str = "reports/bot_traffic_by_origin_summary";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub country_code: String,
}

impl PartitionKey {
    pub fn of(r: &FeatureRecord) -> Self {
        Self {
            year: r.year,
            month: r.month,
            day: r.day,
            country_code: r
                .country_code()
                .filter(|c| !c.is_empty())
                .unwrap_or(UNKNOWN_COUNTRY)
                .to_string(),
        }
    }

    /// Hive-style sink key
    pub fn path(&self) -> String {
        format!(
            "cleaned_logs/year={}/month={:02}/day={:02}/countryCode={}/data",
            self.year, self.month, self.day, self.country_code
        )
    }
}

/// Split records into disjoint partitions; every record lands in exactly one.
pub fn partition(records: &[FeatureRecord]) -> BTreeMap<PartitionKey, Vec<&FeatureRecord>> {
    let mut out: BTreeMap<PartitionKey, Vec<&FeatureRecord>> = BTreeMap::new();
    for r in records {
        out.entry(PartitionKey::of(r)).or_default().push(r);
    }
    out
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub partitions: usize,
    pub written: usize,
    pub failed: usize,
}

pub struct PartitionWriter<'a, S: OutputSink> {
    sink: &'a S,
}

impl<'a, S: OutputSink> PartitionWriter<'a, S> {
    pub fn new(sink: &'a S) -> Self {
        Self { sink }
    }

    fn emit<T: Serialize>(&self, key: &str, rows: &[T], summary: &mut WriteSummary) {
        match self.sink.write(key, rows) {
            Ok(()) => summary.written += 1,
            Err(e) => {
                summary.failed += 1;
                report_degradation(Degradation::SinkWriteFailure, key, &e.to_string());
            }
        }
    }

    /// Write the partitioned dataset and all reports. A failing output does
    /// not stop the others.
    pub fn write_all(&self, records: &[FeatureRecord]) -> WriteSummary {
        let mut summary = WriteSummary::default();

        let parts = partition(records);
        summary.partitions = parts.len();
        for (key, rows) in &parts {
            self.emit(&key.path(), rows, &mut summary);
        }
        info!(partitions = parts.len(), records = records.len(), "cleaned logs written");

        let hourly = hourly_aggregate(records);
        self.emit(HOURLY_KEY, &hourly, &mut summary);
        info!(rows = hourly.len(), "hourly aggregation written");

        let errors = error_report(records);
        self.emit(ERROR_REPORT_KEY, &errors, &mut summary);
        info!(rows = errors.len(), "error report written");

        let bots: Vec<&FeatureRecord> = records.iter().filter(|r| r.enriched.request.is_bot).collect();
        self.emit(BOT_DETAILS_KEY, &bots, &mut summary);
        let by_origin = bot_summary(records);
        self.emit(BOT_SUMMARY_KEY, &by_origin, &mut summary);
        info!(bots = bots.len(), origins = by_origin.len(), "bot traffic reports written");

        summary
    }
}
