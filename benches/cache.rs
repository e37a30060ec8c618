//! Geolocation cache benchmark: warm lookups and store round trips.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use elb_geo_etl::error::LookupError;
use elb_geo_etl::geo::{CacheStore, GeoCache, GeoLookup, GeoResult, GeoStatus, ResolverSettings, SqliteCacheStore};
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tempfile::tempdir;

struct StaticLookup;

impl GeoLookup for StaticLookup {
    fn lookup(&self, ip: &str) -> Result<GeoResult, LookupError> {
        Ok(GeoResult {
            ip: ip.to_string(),
            status: GeoStatus::Success,
            message: None,
            country: Some("United States".to_string()),
            country_code: Some("US".to_string()),
            region: Some("VA".to_string()),
            region_name: Some("Virginia".to_string()),
            city: Some("Ashburn".to_string()),
            lat: Some(39.04),
            lon: Some(-77.49),
            isp: Some("Amazon.com".to_string()),
            fetched_at: Utc::now(),
        })
    }
}

fn settings() -> ResolverSettings {
    ResolverSettings {
        pace: Duration::ZERO,
        rate_limit_backoff: Duration::ZERO,
        max_attempts: 1,
        max_in_flight: 4,
        failure_ttl: None,
    }
}

fn ips(n: usize) -> BTreeSet<String> {
    (0..n).map(|i| format!("10.{}.{}.{}", i / 65_536, (i / 256) % 256, i % 256)).collect()
}

fn bench_warm_resolve(c: &mut Criterion) {
    let wanted = ips(5_000);
    let cancel = AtomicBool::new(false);
    let mut cache = GeoCache::in_memory();
    cache.resolve_many(&wanted, &StaticLookup, &settings(), &cancel);

    c.bench_function("resolve_5000_cached_ips", |b| {
        b.iter(|| black_box(cache.resolve_many(&wanted, &StaticLookup, &settings(), &cancel)))
    });
}

fn bench_sqlite_round_trip(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SqliteCacheStore::open(&dir.path().join("geo.db")).unwrap();
    let mut cache = GeoCache::in_memory();
    cache.resolve_many(&ips(5_000), &StaticLookup, &settings(), &AtomicBool::new(false));
    let entries = cache.entries();

    c.bench_function("sqlite_save_5000", |b| b.iter(|| store.save(black_box(&entries)).unwrap()));
    c.bench_function("sqlite_load_5000", |b| b.iter(|| black_box(store.load().unwrap())));
}

criterion_group!(benches, bench_warm_resolve, bench_sqlite_round_trip);
criterion_main!(benches);
