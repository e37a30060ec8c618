//! ELB access-log ETL: batch enrichment and feature pipeline.
//!
//! Modular structure:
//! - [`ingest`] - Log source listing and reading (local dir, gzip)
//! - [`parser`] - Raw line -> typed request record
//! - [`geo`] - Geolocation lookup and at-most-one-fetch persistent cache
//! - [`enrich`] - Left join of requests with geolocation
//! - [`features`] - Calendar, path, session and rolling-window features
//! - [`output`] - Partitioned dataset, reports and sinks
//! - [`pipeline`] - Run driver
//! - [`logging`] - Structured logging and degradation reporting

pub mod config;
pub mod error;
pub mod ingest;
pub mod parser;
pub mod geo;
pub mod enrich;
pub mod features;
pub mod output;
pub mod pipeline;
pub mod logging;

pub use config::EtlConfig;
pub use error::{EtlError, LookupError, ParseFailure};
pub use ingest::{LocalDirSource, LogSource};
pub use parser::{LineParser, RequestRecord};
pub use geo::{GeoCache, GeoLookup, GeoResult};
pub use enrich::{EnrichedRecord, Enricher};
pub use features::{FeatureEngine, FeatureRecord};
pub use output::{JsonLinesSink, OutputSink, PartitionWriter};
pub use pipeline::{Pipeline, RunSummary};
pub use logging::StructuredLogger;
