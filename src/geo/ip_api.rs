//! ip-api.com client: one blocking GET per ip.

use super::{GeoLookup, GeoResult, GeoStatus};
use crate::config::GeoConfig;
use crate::error::LookupError;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const FIELDS: &str = "status,message,country,countryCode,region,regionName,city,lat,lon,isp,query";

/// Response body of `GET /json/{ip}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: Option<String>,
    message: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    isp: Option<String>,
}

impl IpApiResponse {
    fn into_result(self, ip: &str) -> GeoResult {
        let now = Utc::now();
        if self.status.as_deref() != Some("success") {
            let message = self.message.unwrap_or_else(|| "API Error".to_string());
            return GeoResult::failure(ip, message, now);
        }
        GeoResult {
            ip: ip.to_string(),
            status: GeoStatus::Success,
            message: None,
            country: self.country,
            country_code: self.country_code,
            region: self.region,
            region_name: self.region_name,
            city: self.city,
            lat: self.lat,
            lon: self.lon,
            isp: self.isp,
            fetched_at: now,
        }
    }
}

pub struct IpApiClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl IpApiClient {
    pub fn new(config: &GeoConfig) -> Result<Self, LookupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(5)))
            .build()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, ip: &str) -> String {
        format!("{}/{}?fields={}", self.base_url, ip, FIELDS)
    }
}

impl GeoLookup for IpApiClient {
    fn lookup(&self, ip: &str) -> Result<GeoResult, LookupError> {
        let res = self
            .client
            .get(self.url(ip))
            .send()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(LookupError::RateLimited);
        }
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().unwrap_or_default();
            return Err(LookupError::Transport(format!("{} {}", status, text)));
        }
        let body: IpApiResponse = res.json().map_err(|e| LookupError::Decode(e.to_string()))?;
        Ok(body.into_result(ip))
    }
}
