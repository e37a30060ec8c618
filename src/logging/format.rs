//! Subscriber setup and the degradation channel.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Something that went wrong without stopping the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    CacheLoadCorruption,
    CachePersistFailure,
    GeoLookupFailure,
    FeatureComputationAnomaly,
    SourceReadFailure,
    SinkWriteFailure,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degradation::CacheLoadCorruption => "cache_load_corruption",
            Degradation::CachePersistFailure => "cache_persist_failure",
            Degradation::GeoLookupFailure => "geo_lookup_failure",
            Degradation::FeatureComputationAnomaly => "feature_computation_anomaly",
            Degradation::SourceReadFailure => "source_read_failure",
            Degradation::SinkWriteFailure => "sink_write_failure",
        }
    }
}

/// Emit one structured warning for a contained failure.
/// `scope` names what was affected (an ip, a source key, a partition).
pub fn report_degradation(kind: Degradation, scope: &str, detail: &str) {
    tracing::warn!(
        degradation = kind.as_str(),
        scope = %scope,
        detail = %detail,
        "degraded"
    );
}

/// Initialize tracing with JSON or human-readable output
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber on stderr, level from RUST_LOG or default.
    /// Returns false if a subscriber was already installed.
    pub fn init(json: bool, default_level: &str) -> bool {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt)
                .try_init()
                .is_ok()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .is_ok()
        }
    }
}
