//! Index arena for per-client timelines.
//!
//! Records are never moved: one sort permutation orders them by (client, time),
//! each client owns a contiguous range of that permutation, and the window
//! passes walk those ranges with two pointers.

use std::ops::Range;

/// Sort permutation plus one index range per client.
#[derive(Debug, Clone, Default)]
pub struct ClientRuns {
    /// Record indices ordered by (client, time); ties keep input order
    pub order: Vec<usize>,
    /// Ranges into `order`, one per client, in client order
    pub runs: Vec<Range<usize>>,
}

impl ClientRuns {
    /// `clients[i]` and `times[i]` describe record `i`.
    pub fn build(clients: &[&str], times: &[i64]) -> Self {
        let mut order: Vec<usize> = (0..clients.len()).collect();
        order.sort_by(|&a, &b| clients[a].cmp(clients[b]).then(times[a].cmp(&times[b])));

        let mut runs = Vec::new();
        let mut start = 0;
        for pos in 1..=order.len() {
            if pos == order.len() || clients[order[pos]] != clients[order[start]] {
                if pos > start {
                    runs.push(start..pos);
                }
                start = pos;
            }
        }
        Self { order, runs }
    }
}

/// Session index per record of one client's sorted timeline. A gap strictly
/// greater than `gap` starts the next session.
pub fn session_indices(times: &[i64], gap: i64) -> Vec<u32> {
    let mut out = Vec::with_capacity(times.len());
    let mut idx = 0u32;
    for (i, t) in times.iter().enumerate() {
        if i > 0 && t - times[i - 1] > gap {
            idx += 1;
        }
        out.push(idx);
    }
    out
}

/// For each record of one client's sorted timeline: the count of records in
/// `(t - short, t]` and the mean of non-null `values` in `(t - long, t]`.
///
/// The mean is summed over the window's own values only, so records that
/// have left the window cannot affect it through rounding.
pub fn rolling_windows(times: &[i64], values: &[Option<f64>], short: i64, long: i64) -> Vec<(u32, Option<f64>)> {
    let n = times.len();
    let mut out = Vec::with_capacity(n);
    let (mut lo_short, mut lo_long, mut hi) = (0usize, 0usize, 0usize);
    for &t in times {
        while hi < n && times[hi] <= t {
            hi += 1;
        }
        while lo_short < hi && times[lo_short] <= t - short {
            lo_short += 1;
        }
        while lo_long < hi && times[lo_long] <= t - long {
            lo_long += 1;
        }
        let count = (hi - lo_short) as u32;
        let (sum, present) = values[lo_long..hi]
            .iter()
            .flatten()
            .fold((0.0f64, 0u32), |(s, c), v| (s + v, c + 1));
        let mean = (present > 0).then(|| sum / f64::from(present));
        out.push((count, mean));
    }
    out
}
