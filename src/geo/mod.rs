//! IP geolocation: result type, lookup capability, persistent dedup cache.

mod cache;
mod ip_api;
mod pacer;
mod store;

pub use cache::{GeoCache, Resolution, ResolverSettings};
pub use ip_api::IpApiClient;
pub use pacer::Pacer;
pub use store::{open_store, CacheStore, JsonFileCacheStore, SqliteCacheStore};

use crate::error::LookupError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoStatus {
    Success,
    Fail,
}

impl GeoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoStatus::Success => "success",
            GeoStatus::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "success" {
            GeoStatus::Success
        } else {
            GeoStatus::Fail
        }
    }
}

/// Cached or freshly fetched lookup outcome for one ip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoResult {
    pub ip: String,
    pub status: GeoStatus,
    pub message: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub isp: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl GeoResult {
    /// Negative entry: geo fields null, message set.
    pub fn failure(ip: impl Into<String>, message: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            ip: ip.into(),
            status: GeoStatus::Fail,
            message: Some(message.into()),
            country: None,
            country_code: None,
            region: None,
            region_name: None,
            city: None,
            lat: None,
            lon: None,
            isp: None,
            fetched_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == GeoStatus::Success
    }
}

/// External geolocation capability.
///
/// `Ok` carries either a success or a backend-reported failure (e.g. private
/// range); `Err` means the call itself did not produce an answer.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: &str) -> Result<GeoResult, LookupError>;
}
