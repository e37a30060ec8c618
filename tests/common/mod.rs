//! Shared fixtures: log line builder, scripted geolocation backend, in-memory sink.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use elb_geo_etl::error::{LookupError, Result};
use elb_geo_etl::geo::{GeoLookup, GeoResult, GeoStatus, ResolverSettings};
use elb_geo_etl::output::OutputSink;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const SAMPLE_LINE: &str = concat!(
    "h2 2025-05-26T23:55:02.179979Z app/erank-app/88dfa9dc536560af 3.135.238.214:60827 ",
    "172.31.37.43:80 0.001 0.303 0.000 200 200 74 1013 ",
    "\"POST https://beta.erank.com:443/api/browser-ext-user HTTP/2.0\" ",
    "\"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) ",
    "Chrome/137.0.0.0 Safari/537.36\" TLS_AES_128_GCM_SHA256 TLSv1.3 ",
    "arn:aws:elasticloadbalancing:us-west-2:848357551741:targetgroup/erank-app-v3-production/902b52047b6f4e28 ",
    "\"Root=1-6834ff55-4f9107ec4dcec228218b6176\" \"beta.erank.com\" \"session-reused\" 1 ",
    "2025-05-26T23:55:01.875000Z \"waf,forward\" \"-\" \"-\" \"172.31.37.43:80\" \"200\" \"-\" \"-\" ",
    "TID_b087994534c4ac4abc0185b56b077382"
);

/// One access-log line with the fields tests care about.
#[derive(Debug, Clone)]
pub struct LineSpec {
    pub time: String,
    pub client: String,
    pub status: String,
    pub times: [String; 3],
    pub request: String,
    pub user_agent: String,
    pub error_reason: String,
}

impl LineSpec {
    pub fn new(time: &str, client: &str) -> Self {
        Self {
            time: time.to_string(),
            client: client.to_string(),
            status: "200".to_string(),
            times: ["0.001".to_string(), "0.100".to_string(), "0.000".to_string()],
            request: "GET https://example.com:443/api/items?page=2 HTTP/1.1".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Firefox/126.0".to_string(),
            error_reason: "-".to_string(),
        }
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn processing(mut self, a: &str, b: &str, c: &str) -> Self {
        self.times = [a.to_string(), b.to_string(), c.to_string()];
        self
    }

    pub fn request(mut self, request: &str) -> Self {
        self.request = request.to_string();
        self
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = ua.to_string();
        self
    }

    pub fn error_reason(mut self, reason: &str) -> Self {
        self.error_reason = reason.to_string();
        self
    }

    pub fn render(&self) -> String {
        format!(
            "https {time} app/lb/1 {client}:5000 10.0.0.9:80 {t0} {t1} {t2} {st} {st} 120 2048 \
             \"{req}\" \"{ua}\" ECDHE-RSA-AES128-GCM-SHA256 TLSv1.2 arn:tg \"Root=1-abc\" \"example.com\" \
             \"arn:cert\" 0 {time} \"forward\" \"-\" \"{err}\" \"10.0.0.9:80\" \"{st}\" \"-\" \"-\"",
            time = self.time,
            client = self.client,
            t0 = self.times[0],
            t1 = self.times[1],
            t2 = self.times[2],
            st = self.status,
            req = self.request,
            ua = self.user_agent,
            err = self.error_reason,
        )
    }
}

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// Backend with scripted answers; counts every call.
#[derive(Default)]
pub struct FakeLookup {
    pub calls: AtomicUsize,
    pub per_ip: Mutex<HashMap<String, usize>>,
    /// ip -> (country, country_code, city, isp)
    pub known: HashMap<String, (&'static str, &'static str, &'static str, &'static str)>,
    /// ip -> number of leading rate-limit answers
    pub rate_limited: HashMap<String, usize>,
    pub transport_errors: Vec<String>,
}

impl FakeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knows(mut self, ip: &str, country: &'static str, code: &'static str, city: &'static str, isp: &'static str) -> Self {
        self.known.insert(ip.to_string(), (country, code, city, isp));
        self
    }

    pub fn rate_limit(mut self, ip: &str, times: usize) -> Self {
        self.rate_limited.insert(ip.to_string(), times);
        self
    }

    pub fn broken(mut self, ip: &str) -> Self {
        self.transport_errors.push(ip.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, ip: &str) -> usize {
        self.per_ip.lock().unwrap().get(ip).copied().unwrap_or(0)
    }
}

impl GeoLookup for FakeLookup {
    fn lookup(&self, ip: &str) -> std::result::Result<GeoResult, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seen = {
            let mut per_ip = self.per_ip.lock().unwrap();
            let n = per_ip.entry(ip.to_string()).or_default();
            *n += 1;
            *n
        };
        if let Some(&limit) = self.rate_limited.get(ip) {
            if seen <= limit {
                return Err(LookupError::RateLimited);
            }
        }
        if self.transport_errors.iter().any(|e| e == ip) {
            return Err(LookupError::Transport("connection refused".to_string()));
        }
        let now = Utc::now();
        Ok(match self.known.get(ip) {
            Some((country, code, city, isp)) => GeoResult {
                ip: ip.to_string(),
                status: GeoStatus::Success,
                message: None,
                country: Some(country.to_string()),
                country_code: Some(code.to_string()),
                region: None,
                region_name: None,
                city: Some(city.to_string()),
                lat: Some(1.0),
                lon: Some(2.0),
                isp: Some(isp.to_string()),
                fetched_at: now,
            },
            None => GeoResult::failure(ip, "invalid query", now),
        })
    }
}

pub fn fast_settings() -> ResolverSettings {
    ResolverSettings {
        pace: Duration::ZERO,
        rate_limit_backoff: Duration::ZERO,
        max_attempts: 3,
        max_in_flight: 4,
        failure_ttl: None,
    }
}

/// Keeps every written table as JSON values.
#[derive(Default)]
pub struct MemorySink {
    pub tables: Mutex<BTreeMap<String, Vec<serde_json::Value>>>,
    pub fail_on: Option<String>,
}

impl MemorySink {
    pub fn table(&self, key: &str) -> Vec<serde_json::Value> {
        self.tables.lock().unwrap().get(key).cloned().unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.tables.lock().unwrap().keys().cloned().collect()
    }
}

impl OutputSink for MemorySink {
    fn write<T: Serialize>(&self, key: &str, rows: &[T]) -> Result<()> {
        if self.fail_on.as_deref() == Some(key) {
            return Err(elb_geo_etl::EtlError::Sink("disk full".to_string()));
        }
        let rows = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.tables.lock().unwrap().insert(key.to_string(), rows);
        Ok(())
    }
}
