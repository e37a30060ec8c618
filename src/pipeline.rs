//! Run driver: list -> parse -> enrich -> features -> write.

use crate::config::EtlConfig;
use crate::enrich::{EnrichStats, Enricher};
use crate::error::{EtlError, ParseFailure, Result};
use crate::features::FeatureEngine;
use crate::geo::{GeoCache, GeoLookup, ResolverSettings};
use crate::ingest::LogSource;
use crate::logging::{report_degradation, Degradation};
use crate::output::{OutputSink, PartitionWriter, WriteSummary};
use crate::parser::{LineParser, RequestRecord, UaClassifier};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

const SAMPLE_ROWS: usize = 5;

/// Line counts for one source or a whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    pub parsed: usize,
    pub malformed: usize,
    pub bad_timestamp: usize,
}

impl ParseStats {
    fn add(&mut self, other: ParseStats) {
        self.parsed += other.parsed;
        self.malformed += other.malformed;
        self.bad_timestamp += other.bad_timestamp;
    }

    pub fn dropped(&self) -> usize {
        self.malformed + self.bad_timestamp
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub sources: usize,
    pub sources_failed: usize,
    pub parse: ParseStats,
    pub enrich: EnrichStats,
    pub features: usize,
    pub write: WriteSummary,
}

pub struct Pipeline {
    parser: LineParser,
    engine: FeatureEngine,
    settings: ResolverSettings,
    workers: usize,
}

impl Pipeline {
    pub fn new(config: &EtlConfig, classifier: Box<dyn UaClassifier>) -> Self {
        let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            parser: LineParser::new(&config.parser, classifier),
            engine: FeatureEngine::new(config.features.clone()),
            settings: ResolverSettings::from(&config.geo),
            workers,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn parser(&self) -> &LineParser {
        &self.parser
    }

    /// Parse one source's lines; dropped lines are only counted.
    pub fn parse_lines(&self, lines: &[String], source_id: &str) -> (Vec<RequestRecord>, ParseStats) {
        let mut stats = ParseStats::default();
        let mut records = Vec::with_capacity(lines.len());
        for line in lines {
            match self.parser.parse(line, source_id) {
                Ok(r) => {
                    stats.parsed += 1;
                    records.push(r);
                }
                Err(ParseFailure::MalformedLine(reason)) => {
                    stats.malformed += 1;
                    debug!(source = source_id, %reason, "malformed line dropped");
                }
                Err(ParseFailure::UnparseableTimestamp(raw)) => {
                    stats.bad_timestamp += 1;
                    debug!(source = source_id, time = %raw, "invalid timestamp dropped");
                }
            }
        }
        (records, stats)
    }

    /// Read and parse every source across worker threads. Results keep source
    /// order. A source that cannot be read is reported and skipped.
    pub fn parse_all(&self, source: &dyn LogSource, ids: &[String]) -> (Vec<RequestRecord>, ParseStats, usize) {
        let cursor = AtomicUsize::new(0);
        let done: Mutex<Vec<(usize, Option<(Vec<RequestRecord>, ParseStats)>)>> = Mutex::new(Vec::new());
        let workers = self.workers.min(ids.len()).max(1);

        std::thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| loop {
                    let i = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(id) = ids.get(i) else { break };
                    let batch = match source.read(id) {
                        Ok(lines) => {
                            let (records, stats) = self.parse_lines(&lines, id);
                            info!(source = %id, parsed = stats.parsed, dropped = stats.dropped(), "source parsed");
                            Some((records, stats))
                        }
                        Err(e) => {
                            report_degradation(Degradation::SourceReadFailure, id, &e.to_string());
                            None
                        }
                    };
                    match done.lock() {
                        Ok(mut d) => d.push((i, batch)),
                        Err(poisoned) => poisoned.into_inner().push((i, batch)),
                    }
                });
            }
        });

        let mut done = done.into_inner().unwrap_or_else(|p| p.into_inner());
        done.sort_by_key(|(i, _)| *i);

        let mut records = Vec::new();
        let mut stats = ParseStats::default();
        let mut failed = 0;
        for (_, batch) in done {
            match batch {
                Some((r, s)) => {
                    records.extend(r);
                    stats.add(s);
                }
                None => failed += 1,
            }
        }
        (records, stats, failed)
    }

    /// One full batch run. Fails early, before any output, when there are no
    /// sources; fails with [`EtlError::Cancelled`] after the cache step when
    /// `cancel` was raised.
    pub fn run<S: OutputSink>(
        &self,
        source: &dyn LogSource,
        lookup: &dyn GeoLookup,
        cache: &mut GeoCache,
        sink: &S,
        cancel: &AtomicBool,
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        let _guard = span.enter();

        let ids = source.list().map_err(|e| EtlError::NoInput(e.to_string()))?;
        if ids.is_empty() {
            return Err(EtlError::NoInput("no log files found".to_string()));
        }
        info!(sources = ids.len(), "log sources listed");

        let (records, parse, sources_failed) = self.parse_all(source, &ids);
        info!(
            records = records.len(),
            malformed = parse.malformed,
            bad_timestamp = parse.bad_timestamp,
            "parsing complete"
        );
        for r in records.iter().take(SAMPLE_ROWS) {
            if let Ok(json) = serde_json::to_string(r) {
                debug!(sample = %json, "parsed record");
            }
        }
        if cancel.load(Ordering::Relaxed) {
            return Err(EtlError::Cancelled);
        }

        info!("enriching logs with geolocation data");
        let enricher = Enricher::new(lookup, self.settings.clone());
        let (enriched, enrich) = enricher.enrich(records, cache, cancel);
        info!(
            distinct_ips = enrich.distinct_ips,
            lookups = enrich.lookups,
            matched = enrich.matched,
            "enrichment complete"
        );
        if cancel.load(Ordering::Relaxed) {
            return Err(EtlError::Cancelled);
        }

        info!("adding features");
        let features = self.engine.compute(enriched);

        let write = PartitionWriter::new(sink).write_all(&features);
        let summary = RunSummary {
            run_id,
            sources: ids.len(),
            sources_failed,
            parse,
            enrich,
            features: features.len(),
            write,
        };
        info!(
            records = summary.features,
            partitions = summary.write.partitions,
            outputs_failed = summary.write.failed,
            "run complete"
        );
        Ok(summary)
    }
}
