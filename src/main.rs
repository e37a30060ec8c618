//! ELB log ETL entrypoint: one batch run over the configured log directory.
//! Ctrl+C stops new geolocation lookups; what was fetched is still persisted.

use elb_geo_etl::{
    config::EtlConfig,
    geo::{open_store, GeoCache, IpApiClient},
    ingest::LocalDirSource,
    logging::{report_degradation, Degradation, StructuredLogger},
    output::JsonLinesSink,
    parser::RuleClassifier,
    pipeline::Pipeline,
    EtlError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("ELB_ETL_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = EtlConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(log_dir = ?config.input.log_dir, output_dir = ?config.output_dir, "ELB log ETL starting");

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(e) = ctrlc::set_handler(move || {
            cancel.store(true, Ordering::Relaxed);
        }) {
            warn!(error = %e, "could not install Ctrl+C handler");
        }
    }

    std::fs::create_dir_all(&config.output_dir)?;
    let mut cache = match open_store(&config.geo) {
        Ok(store) => GeoCache::load(store),
        Err(e) => {
            report_degradation(Degradation::CacheLoadCorruption, "geo_cache", &e.to_string());
            GeoCache::in_memory()
        }
    };

    let source = LocalDirSource::new(&config.input.log_dir, config.input.suffix.clone());
    let lookup = IpApiClient::new(&config.geo)?;
    let sink = JsonLinesSink::new(&config.output_dir);
    let pipeline = Pipeline::new(&config, Box::new(RuleClassifier));

    match pipeline.run(&source, &lookup, &mut cache, &sink, &cancel) {
        Ok(summary) => {
            info!(
                run_id = %summary.run_id,
                records = summary.features,
                dropped_lines = summary.parse.dropped(),
                "ELB log ETL complete"
            );
            Ok(())
        }
        Err(EtlError::NoInput(reason)) => {
            warn!(%reason, "nothing to process; exiting");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
