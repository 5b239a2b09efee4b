//! Statistics collection and reporting for benchmarks
//!
//! Uses HDR Histogram for accurate latency percentile calculation. Latencies
//! are recorded in microseconds.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use hdrhistogram::Histogram;
use tracing::warn;

use crate::errors::{QuickError, Result};
use crate::utils::{format_duration, round_duration};

const SIGNIFICANT_DIGITS: u8 = 5;
const PERCENTILES: [f64; 7] = [50.0, 75.0, 90.0, 95.0, 99.0, 99.5, 99.9];

/// Result of one benchmark attempt
///
/// Exactly one of `error` and `status` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub error: Option<String>,
    pub status: Option<u16>,
    pub elapsed: Duration,
}

impl RequestOutcome {
    pub fn status(status: u16, elapsed: Duration) -> Self {
        Self {
            error: None,
            status: Some(status),
            elapsed,
        }
    }

    pub fn error(desc: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            error: Some(desc.into()),
            status: None,
            elapsed,
        }
    }
}

/// Per-connection benchmark accumulator
#[derive(Debug, Clone)]
pub struct HistogramStat {
    requests: u64,
    bad_status: u64,
    errors: BTreeMap<String, u64>,
    latency: Histogram<u64>,
}

impl HistogramStat {
    /// Create an empty stat whose histogram covers `[1µs, duration]`
    pub fn new(duration: Duration) -> Result<Self> {
        let high = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX).max(2);
        let latency = Histogram::new_with_bounds(1, high, SIGNIFICANT_DIGITS)
            .map_err(|e| QuickError::Worker(format!("Failed to create histogram: {}", e)))?;

        Ok(Self {
            requests: 0,
            bad_status: 0,
            errors: BTreeMap::new(),
            latency,
        })
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Responses with a status outside `[200, 400)`
    pub fn bad_status(&self) -> u64 {
        self.bad_status
    }

    pub fn errors(&self) -> &BTreeMap<String, u64> {
        &self.errors
    }

    pub fn latency(&self) -> &Histogram<u64> {
        &self.latency
    }

    /// Record a request result
    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.requests += 1;

        match (&outcome.error, outcome.status) {
            (Some(desc), _) => *self.errors.entry(desc.clone()).or_insert(0) += 1,
            (None, Some(code)) if !(200..400).contains(&code) => self.bad_status += 1,
            _ => {}
        }

        // latency counts even when the request failed
        let micros = u64::try_from(outcome.elapsed.as_micros()).unwrap_or(u64::MAX);
        if let Err(e) = self.latency.record(micros) {
            warn!("failed to record latency {:?}: {}", outcome.elapsed, e);
        }
    }

    /// Fold another stat into this one
    pub fn merge(&mut self, other: &HistogramStat) {
        self.requests += other.requests;
        self.bad_status += other.bad_status;
        for (desc, count) in &other.errors {
            *self.errors.entry(desc.clone()).or_insert(0) += count;
        }
        if let Err(e) = self.latency.add(&other.latency) {
            warn!("failed to merge latency histogram: {}", e);
        }
    }

    /// Share of samples whose bucket starts within one stdev of the mean,
    /// truncated to two decimals
    fn in_stdev_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        let mean = self.latency.mean();
        let stdev = self.latency.stdev();
        let up = (mean + stdev) as i64;
        let low = (mean - stdev) as i64;

        let mut count: u64 = 0;
        for bar in self.latency.iter_recorded() {
            let from = self.latency.lowest_equivalent(bar.value_iterated_to()) as i64;
            if from >= up {
                break;
            }
            if from >= low {
                count += bar.count_at_value();
            }
        }
        (count * 10000 / self.requests) as f64 / 100.0
    }

    /// Print the report for a run that took `wall_time`
    pub fn report(&self, out: &mut dyn Write, wall_time: Duration) -> std::io::Result<()> {
        writeln!(out, "  {} requests in {}", self.requests, format_duration(wall_time))?;

        let table = [
            [
                "Item".to_string(),
                "Avg".to_string(),
                "Stdev".to_string(),
                "Max".to_string(),
                "+/-Stdev".to_string(),
            ],
            [
                "Latency".to_string(),
                format_latency(self.latency.mean()),
                format_latency(self.latency.stdev()),
                format_latency(self.latency.max() as f64),
                format!("{:.2}%", self.in_stdev_rate()),
            ],
        ];
        for row in &table {
            writeln!(
                out,
                "  {:>10} {:>8} {:>10} {:>9} {:>10}",
                row[0], row[1], row[2], row[3], row[4]
            )?;
        }

        writeln!(out, "  Latency Distribution")?;
        for p in PERCENTILES {
            let value = self.latency.value_at_percentile(p);
            writeln!(out, "    {:.1}%\t{}", p, format_latency(value as f64))?;
        }

        if self.bad_status > 0 {
            writeln!(out, "  Non-2xx or 3xx responses: {}", self.bad_status)?;
        }

        if !self.errors.is_empty() {
            writeln!(out, "  Errors:")?;
            for (desc, count) in &self.errors {
                writeln!(out, "\t{}\t{}", desc, count)?;
            }
        }

        let secs = wall_time.as_secs_f64();
        let rate = if secs > 0.0 { self.requests as f64 / secs } else { 0.0 };
        writeln!(out, "Requests/sec:    {:.6}", rate)
    }
}

/// Format a latency in microseconds, rounded to 10µs
fn format_latency(micros: f64) -> String {
    let d = Duration::from_nanos((micros * 1000.0).max(0.0) as u64);
    format_duration(round_duration(d, Duration::from_micros(10)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn stat_with(outcomes: &[RequestOutcome]) -> HistogramStat {
        let mut stat = HistogramStat::new(Duration::from_secs(10)).unwrap();
        for o in outcomes {
            stat.record(o);
        }
        stat
    }

    fn summary(stat: &HistogramStat) -> (u64, u64, BTreeMap<String, u64>, u64) {
        (stat.requests(), stat.bad_status(), stat.errors().clone(), stat.latency().len())
    }

    #[test]
    fn test_record_classifies_outcomes() {
        let stat = stat_with(&[
            RequestOutcome::status(200, ms(1)),
            RequestOutcome::status(302, ms(1)),
            RequestOutcome::status(101, ms(1)),
            RequestOutcome::status(404, ms(2)),
            RequestOutcome::status(503, ms(2)),
            RequestOutcome::error("connect timeout", ms(1000)),
            RequestOutcome::error("connect timeout", ms(1000)),
        ]);

        assert_eq!(stat.requests(), 7);
        assert_eq!(stat.bad_status(), 3);
        assert_eq!(stat.errors().get("connect timeout"), Some(&2));
        // failures are sampled too
        assert_eq!(stat.latency().len(), 7);
    }

    #[test]
    fn test_out_of_range_sample_still_counts() {
        let mut stat = HistogramStat::new(ms(10)).unwrap();
        stat.record(&RequestOutcome::status(200, Duration::from_secs(5)));
        assert_eq!(stat.requests(), 1);
        assert_eq!(stat.latency().len(), 0);
    }

    #[test]
    fn test_merge_counts() {
        let errs: Vec<_> = (0..5)
            .map(|i| {
                if i == 0 {
                    RequestOutcome::error("reset", ms(1))
                } else {
                    RequestOutcome::status(200, ms(1))
                }
            })
            .collect();
        let mut a = stat_with(&errs);
        let b = stat_with(&[
            RequestOutcome::status(200, ms(2)),
            RequestOutcome::status(200, ms(2)),
            RequestOutcome::status(200, ms(2)),
        ]);

        a.merge(&b);
        assert_eq!(a.requests(), 8);
        assert_eq!(a.errors().get("reset"), Some(&1));
        assert_eq!(a.latency().len(), 8);
    }

    #[test]
    fn test_merge_associative_commutative() {
        let first = [RequestOutcome::status(200, ms(1)), RequestOutcome::error("x", ms(3))];
        let second = [RequestOutcome::status(500, ms(7))];
        let third = [RequestOutcome::error("x", ms(2)), RequestOutcome::error("y", ms(9))];
        let a = stat_with(&first);
        let b = stat_with(&second);
        let c = stat_with(&third);

        let mut ab_c = a.clone();
        ab_c.merge(&b);
        ab_c.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut a_bc = a.clone();
        a_bc.merge(&bc);

        let mut cba = c.clone();
        cba.merge(&b);
        cba.merge(&a);

        assert_eq!(summary(&ab_c), summary(&a_bc));
        assert_eq!(summary(&ab_c), summary(&cba));
        assert_eq!(ab_c.latency().max(), cba.latency().max());
        assert_eq!(ab_c.errors().get("x"), Some(&2));

        // merging is the same as recording everything into one stat
        let all: Vec<_> = first.iter().chain(&second).chain(&third).cloned().collect();
        let single = stat_with(&all);
        for merged in [&ab_c, &a_bc, &cba] {
            assert_eq!(summary(merged), summary(&single));
            assert_eq!(merged.latency().mean(), single.latency().mean());
            assert_eq!(
                merged.latency().value_at_percentile(99.0),
                single.latency().value_at_percentile(99.0)
            );
        }
    }

    #[test]
    fn test_report_format() {
        let mut outcomes: Vec<_> = (0..10).map(|_| RequestOutcome::status(200, ms(1))).collect();
        outcomes.push(RequestOutcome::status(404, ms(1)));
        outcomes.push(RequestOutcome::error("connect timeout", ms(1)));
        let stat = stat_with(&outcomes);

        let mut out = Vec::new();
        stat.report(&mut out, Duration::from_secs(2)).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("  12 requests in 2s\n"));
        assert!(text.contains("        Item      Avg      Stdev       Max   +/-Stdev\n"));
        // zero stdev leaves an empty [mean - stdev, mean + stdev) window
        assert!(text.contains("     Latency      1ms         0s       1ms      0.00%\n"));
        assert!(text.contains("  Latency Distribution\n    50.0%\t1ms\n"));
        assert!(text.contains("    99.9%\t1ms\n"));
        assert!(text.contains("  Non-2xx or 3xx responses: 1\n"));
        assert!(text.contains("  Errors:\n\tconnect timeout\t1\n"));
        assert!(text.ends_with("Requests/sec:    6.000000\n"));
    }

    #[test]
    fn test_in_stdev_rate() {
        let mut outcomes: Vec<_> = (0..5).map(|_| RequestOutcome::status(200, ms(1))).collect();
        outcomes.extend((0..5).map(|_| RequestOutcome::status(200, ms(3))));
        let stat = stat_with(&outcomes);

        let mut out = Vec::new();
        stat.report(&mut out, Duration::from_secs(1)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("     Latency      2ms        1ms       3ms     50.00%\n"));
    }

    #[test]
    fn test_report_omits_empty_sections() {
        let stat = stat_with(&[RequestOutcome::status(200, ms(1))]);
        let mut out = Vec::new();
        stat.report(&mut out, Duration::from_secs(1)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("Non-2xx"));
        assert!(!text.contains("Errors:"));
    }

    #[test]
    fn test_empty_report() {
        let stat = HistogramStat::new(Duration::from_secs(1)).unwrap();
        let mut out = Vec::new();
        stat.report(&mut out, Duration::from_secs(1)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("0.00%"));
        assert!(text.ends_with("Requests/sec:    0.000000\n"));
    }
}
