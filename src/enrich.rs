//! Left join of parsed requests against geolocation results.

use crate::geo::{GeoCache, GeoLookup, GeoResult, GeoStatus, ResolverSettings};
use crate::logging::{report_degradation, Degradation};
use crate::parser::RequestRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

/// Geo columns joined onto a request; all null when the ip did not resolve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoFields {
    pub geo_status: Option<GeoStatus>,
    pub country_name: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub isp: Option<String>,
}

impl GeoFields {
    fn from_result(r: &GeoResult) -> Self {
        if !r.is_success() {
            return Self {
                geo_status: Some(r.status),
                ..Self::default()
            };
        }
        Self {
            geo_status: Some(r.status),
            country_name: r.country.clone(),
            country_code: r.country_code.clone(),
            region: r.region.clone(),
            region_name: r.region_name.clone(),
            city: r.city.clone(),
            lat: r.lat,
            lon: r.lon,
            isp: r.isp.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub request: RequestRecord,
    #[serde(flatten)]
    pub geo: GeoFields,
}

/// Counters from one enrichment pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichStats {
    pub distinct_ips: usize,
    pub lookups: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub matched: usize,
}

pub struct Enricher<'a> {
    lookup: &'a dyn GeoLookup,
    settings: ResolverSettings,
}

impl<'a> Enricher<'a> {
    pub fn new(lookup: &'a dyn GeoLookup, settings: ResolverSettings) -> Self {
        Self { lookup, settings }
    }

    /// Resolve every distinct client ip, persist newly fetched results, join.
    /// Every input record comes out, in input order.
    pub fn enrich(
        &self,
        records: Vec<RequestRecord>,
        cache: &mut GeoCache,
        cancel: &AtomicBool,
    ) -> (Vec<EnrichedRecord>, EnrichStats) {
        let ips: BTreeSet<String> = records
            .iter()
            .filter(|r| !r.client_ip.is_empty())
            .map(|r| r.client_ip.clone())
            .collect();

        let resolution = cache.resolve_many(&ips, self.lookup, &self.settings, cancel);
        let mut stats = EnrichStats {
            distinct_ips: ips.len(),
            lookups: resolution.lookups,
            fetched: resolution.fetched.len(),
            skipped: resolution.skipped,
            matched: 0,
        };

        if !resolution.fetched.is_empty() {
            if let Err(e) = cache.merge_and_persist(resolution.fetched) {
                report_degradation(Degradation::CachePersistFailure, "geo_cache", &e.to_string());
            }
        }

        let out: Vec<EnrichedRecord> = records
            .into_iter()
            .map(|request| {
                let geo = resolution
                    .resolved
                    .get(&request.client_ip)
                    .map(GeoFields::from_result)
                    .unwrap_or_default();
                EnrichedRecord { request, geo }
            })
            .collect();
        stats.matched = out
            .iter()
            .filter(|r| r.geo.geo_status == Some(GeoStatus::Success))
            .count();
        (out, stats)
    }
}
