//! Feature computation over a full run: enriched records -> feature records.

use super::window::{rolling_windows, session_indices, ClientRuns};
use super::{path_depth, path_main_segment, FeatureRecord, StatusClass};
use crate::config::FeaturesConfig;
use crate::enrich::EnrichedRecord;
use crate::logging::{report_degradation, Degradation};
use chrono::{Datelike, Timelike, Weekday};

const MICROS_PER_MIN: i64 = 60_000_000;

pub struct FeatureEngine {
    config: FeaturesConfig,
}

impl FeatureEngine {
    pub fn new(config: FeaturesConfig) -> Self {
        Self { config }
    }

    /// Compute features for every record of the run.
    ///
    /// Needs the whole batch: sessions and windows are taken over each
    /// client's complete timeline. Output is ordered by (client_ip, log_time).
    pub fn compute(&self, records: Vec<EnrichedRecord>) -> Vec<FeatureRecord> {
        let before = records.len();
        let records: Vec<EnrichedRecord> = records
            .into_iter()
            .filter(|r| !r.request.client_ip.is_empty())
            .collect();
        if records.len() < before {
            report_degradation(
                Degradation::FeatureComputationAnomaly,
                "client_ip",
                &format!("{} records without client dropped", before - records.len()),
            );
        }

        let times: Vec<i64> = records
            .iter()
            .map(|r| r.request.log_time.timestamp_micros())
            .collect();
        let arena = {
            let clients: Vec<&str> = records.iter().map(|r| r.request.client_ip.as_str()).collect();
            ClientRuns::build(&clients, &times)
        };

        let gap = self.config.session_gap_mins * MICROS_PER_MIN;
        let short = self.config.short_window_mins * MICROS_PER_MIN;
        let long = self.config.long_window_mins * MICROS_PER_MIN;

        // Per sorted position: (session index, 5min count, 1h mean)
        let mut derived = Vec::with_capacity(records.len());
        for run in &arena.runs {
            let idx = &arena.order[run.clone()];
            let t: Vec<i64> = idx.iter().map(|&i| times[i]).collect();
            let v: Vec<Option<f64>> = idx
                .iter()
                .map(|&i| records[i].request.total_processing_ms)
                .collect();
            let sessions = session_indices(&t, gap);
            let windows = rolling_windows(&t, &v, short, long);
            derived.extend(sessions.into_iter().zip(windows));
        }

        let mut slots: Vec<Option<EnrichedRecord>> = records.into_iter().map(Some).collect();
        arena
            .order
            .iter()
            .zip(derived)
            .filter_map(|(&i, (session, (count, mean)))| {
                slots[i].take().map(|r| Self::derive(r, session, count, mean))
            })
            .collect()
    }

    fn derive(enriched: EnrichedRecord, session: u32, count: u32, mean: Option<f64>) -> FeatureRecord {
        let req = &enriched.request;
        let t = req.log_time;
        let session_id = format!("{}-{}", req.client_ip, session);
        let path = req.path.as_deref();
        FeatureRecord {
            status_class: StatusClass::from_code(req.elb_status_code),
            year: t.year(),
            month: t.month(),
            day: t.day(),
            hour: t.hour(),
            day_of_week: day_name(t.weekday()).to_string(),
            week_of_year: t.iso_week().week(),
            path_depth: path_depth(path),
            path_main_segment: path_main_segment(path),
            session_id,
            rolling_5min_request_count: count,
            rolling_1h_avg_processing_ms: mean,
            enriched,
        }
    }
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
