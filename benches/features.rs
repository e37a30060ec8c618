//! Feature benchmark: sessionization and rolling windows over many clients.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use elb_geo_etl::config::FeaturesConfig;
use elb_geo_etl::enrich::{EnrichedRecord, GeoFields};
use elb_geo_etl::features::{rolling_windows, session_indices, FeatureEngine};
use elb_geo_etl::parser::LineParser;

const MIN: i64 = 60_000_000;

fn line(i: usize) -> String {
    let at = Utc.with_ymd_and_hms(2025, 5, 26, 0, 0, 0).unwrap() + Duration::seconds((i * 37 % 86_400) as i64);
    format!(
        "https {} app/lb/1 10.0.{}.{}:5000 10.0.0.9:80 0.001 0.050 0.000 200 200 120 2048 \
         \"GET https://example.com:443/api/items HTTP/1.1\" \"Mozilla/5.0 (X11; Linux x86_64) Firefox/126.0\" \
         - - arn:tg \"Root=1\" \"example.com\" \"-\" 0 - \"forward\" \"-\" \"-\" \"-\" \"200\" \"-\" \"-\"",
        at.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
        i % 50,
        i % 200,
    )
}

fn make_records(n: usize) -> Vec<EnrichedRecord> {
    let parser = LineParser::with_defaults();
    (0..n)
        .filter_map(|i| parser.parse(&line(i), "bench").ok())
        .map(|request| EnrichedRecord {
            request,
            geo: GeoFields::default(),
        })
        .collect()
}

fn bench_engine(c: &mut Criterion) {
    let engine = FeatureEngine::new(FeaturesConfig::default());
    let records = make_records(10_000);

    c.bench_function("features_10k_records", |b| {
        b.iter(|| black_box(engine.compute(black_box(records.clone()))))
    });
}

fn bench_windows(c: &mut Criterion) {
    let times: Vec<i64> = (0..10_000).map(|i| i * MIN / 7).collect();
    let values: Vec<Option<f64>> = (0..10_000).map(|i| (i % 9 != 0).then_some(i as f64)).collect();

    c.bench_function("rolling_windows_10k", |b| {
        b.iter(|| black_box(rolling_windows(&times, &values, 5 * MIN, 60 * MIN)))
    });
    c.bench_function("session_indices_10k", |b| {
        b.iter(|| black_box(session_indices(&times, 30 * MIN)))
    });
}

criterion_group!(benches, bench_engine, bench_windows);
criterion_main!(benches);
