//! Report tables derived from the feature records.

use crate::features::{FeatureRecord, StatusClass};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyAggregateRow {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub country_name: Option<String>,
    pub city: Option<String>,
    pub request_count: usize,
    pub unique_client_ips_count: usize,
    pub average_total_processing_time: Option<f64>,
    pub median_total_processing_time: Option<f64>,
    pub sum_sent_bytes: i64,
    pub sum_received_bytes: i64,
    pub count_2xx: usize,
    pub count_3xx: usize,
    pub count_4xx: usize,
    pub count_5xx: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReportRow {
    pub log_time: DateTime<FixedOffset>,
    pub client_ip: String,
    pub city: Option<String>,
    pub country_name: Option<String>,
    pub isp: Option<String>,
    pub http_method: String,
    pub url: String,
    pub elb_status_code: Option<i64>,
    pub target_status_code_list: String,
    pub user_agent: String,
    pub ua_browser_family: String,
    pub ua_os_family: String,
    pub error_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotOriginRow {
    pub country_name: Option<String>,
    pub isp: Option<String>,
    pub bot_request_count: usize,
}

type HourKey = (i32, u32, u32, u32, Option<String>, Option<String>);

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Traffic per hour and location. Records with unknown country or city form
/// their own groups rather than being left out.
pub fn hourly_aggregate(records: &[FeatureRecord]) -> Vec<HourlyAggregateRow> {
    let mut groups: BTreeMap<HourKey, Vec<&FeatureRecord>> = BTreeMap::new();
    for r in records {
        let key = (
            r.year,
            r.month,
            r.day,
            r.hour,
            r.enriched.geo.country_name.clone(),
            r.enriched.geo.city.clone(),
        );
        groups.entry(key).or_default().push(r);
    }

    groups
        .into_iter()
        .map(|((year, month, day, hour, country_name, city), rows)| {
            let clients: HashSet<&str> = rows.iter().map(|r| r.client_ip()).collect();
            let mut times: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.enriched.request.total_processing_ms)
                .collect();
            let average = (!times.is_empty()).then(|| times.iter().sum::<f64>() / times.len() as f64);
            let count = |class: StatusClass| rows.iter().filter(|r| r.status_class == class).count();
            HourlyAggregateRow {
                year,
                month,
                day,
                hour,
                country_name,
                city,
                request_count: rows.len(),
                unique_client_ips_count: clients.len(),
                average_total_processing_time: average,
                median_total_processing_time: median(&mut times),
                sum_sent_bytes: rows.iter().filter_map(|r| r.enriched.request.sent_bytes).sum(),
                sum_received_bytes: rows.iter().filter_map(|r| r.enriched.request.received_bytes).sum(),
                count_2xx: count(StatusClass::Success),
                count_3xx: count(StatusClass::Redirection),
                count_4xx: count(StatusClass::ClientError),
                count_5xx: count(StatusClass::ServerError),
            }
        })
        .collect()
}

/// 4xx and 5xx requests, projected to the reporting columns.
pub fn error_report(records: &[FeatureRecord]) -> Vec<ErrorReportRow> {
    records
        .iter()
        .filter(|r| r.status_class.is_error())
        .map(|r| {
            let req = &r.enriched.request;
            let geo = &r.enriched.geo;
            ErrorReportRow {
                log_time: req.log_time,
                client_ip: req.client_ip.clone(),
                city: geo.city.clone(),
                country_name: geo.country_name.clone(),
                isp: geo.isp.clone(),
                http_method: req.http_method.clone(),
                url: req.url.clone(),
                elb_status_code: req.elb_status_code,
                target_status_code_list: req.raw.target_status_code_list.clone(),
                user_agent: req.user_agent_raw.clone(),
                ua_browser_family: req.ua_browser_family.clone(),
                ua_os_family: req.ua_os_family.clone(),
                error_reason: req.raw.error_reason.clone(),
            }
        })
        .collect()
}

/// Bot request counts per (country, isp).
pub fn bot_summary(records: &[FeatureRecord]) -> Vec<BotOriginRow> {
    let mut counts: BTreeMap<(Option<String>, Option<String>), usize> = BTreeMap::new();
    for r in records.iter().filter(|r| r.enriched.request.is_bot) {
        let key = (r.enriched.geo.country_name.clone(), r.enriched.geo.isp.clone());
        *counts.entry(key).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((country_name, isp), bot_request_count)| BotOriginRow {
            country_name,
            isp,
            bot_request_count,
        })
        .collect()
}
