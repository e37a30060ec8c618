//! Per-record and per-client derived features.

mod engine;
mod window;

pub use engine::FeatureEngine;
pub use window::{rolling_windows, session_indices, ClientRuns};

use crate::enrich::EnrichedRecord;
use serde::{Deserialize, Serialize};

/// Bucket of the load balancer's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusClass {
    #[serde(rename = "1xx_Informational")]
    Informational,
    #[serde(rename = "2xx_Success")]
    Success,
    #[serde(rename = "3xx_Redirection")]
    Redirection,
    #[serde(rename = "4xx_ClientError")]
    ClientError,
    #[serde(rename = "5xx_ServerError")]
    ServerError,
    Unknown,
}

impl StatusClass {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(100..=199) => StatusClass::Informational,
            Some(200..=299) => StatusClass::Success,
            Some(300..=399) => StatusClass::Redirection,
            Some(400..=499) => StatusClass::ClientError,
            Some(500..=599) => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Informational => "1xx_Informational",
            StatusClass::Success => "2xx_Success",
            StatusClass::Redirection => "3xx_Redirection",
            StatusClass::ClientError => "4xx_ClientError",
            StatusClass::ServerError => "5xx_ServerError",
            StatusClass::Unknown => "Unknown",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StatusClass::ClientError | StatusClass::ServerError)
    }
}

/// Enriched record plus derived calendar, path, session and window features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(flatten)]
    pub enriched: EnrichedRecord,
    pub status_class: StatusClass,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub day_of_week: String,
    pub week_of_year: u32,
    pub path_depth: Option<usize>,
    pub path_main_segment: Option<String>,
    pub session_id: String,
    pub rolling_5min_request_count: u32,
    pub rolling_1h_avg_processing_ms: Option<f64>,
}

impl FeatureRecord {
    pub fn client_ip(&self) -> &str {
        &self.enriched.request.client_ip
    }

    pub fn country_code(&self) -> Option<&str> {
        self.enriched.geo.country_code.as_deref()
    }
}

/// Number of `/` in the path.
pub fn path_depth(path: Option<&str>) -> Option<usize> {
    path.map(|p| p.matches('/').count())
}

/// First non-empty segment of the path.
pub fn path_main_segment(path: Option<&str>) -> Option<String> {
    path?.split('/').find(|s| !s.is_empty()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_buckets() {
        assert_eq!(StatusClass::from_code(Some(101)), StatusClass::Informational);
        assert_eq!(StatusClass::from_code(Some(200)), StatusClass::Success);
        assert_eq!(StatusClass::from_code(Some(302)), StatusClass::Redirection);
        assert_eq!(StatusClass::from_code(Some(404)), StatusClass::ClientError);
        assert_eq!(StatusClass::from_code(Some(503)), StatusClass::ServerError);
        assert_eq!(StatusClass::from_code(Some(600)), StatusClass::Unknown);
        assert_eq!(StatusClass::from_code(Some(-1)), StatusClass::Unknown);
        assert_eq!(StatusClass::from_code(None), StatusClass::Unknown);
    }

    #[test]
    fn path_features() {
        assert_eq!(path_depth(Some("/api/browser-ext-user")), Some(2));
        assert_eq!(path_main_segment(Some("/api/browser-ext-user")).as_deref(), Some("api"));
        assert_eq!(path_depth(Some("/")), Some(1));
        assert_eq!(path_main_segment(Some("/")), None);
        assert_eq!(path_main_segment(Some("//x/y")).as_deref(), Some("x"));
        assert_eq!(path_depth(None), None);
        assert_eq!(path_main_segment(None), None);
    }

    #[test]
    fn status_class_serializes_to_label() {
        let s = serde_json::to_string(&StatusClass::ClientError).unwrap();
        assert_eq!(s, "\"4xx_ClientError\"");
    }
}
