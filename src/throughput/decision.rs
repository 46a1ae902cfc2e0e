//! Retransmit-rate threshold decision.

use super::iperf::MetricRecord;
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_THRESHOLD_PERCENT: f64 = 0.001;

/// Assumed run length when the report carries no duration.
const FALLBACK_DURATION_SECS: f64 = 30.0;

/// Outcome of analyzing one measurement run.
///
/// `ok` is false only when no report could be parsed; a parsed report always
/// reports ok, and the threshold comparison is surfaced through the advisory
/// fields and the log rather than the flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub ok: bool,
    pub reason: String,
    pub retransmit_rate_percent: Option<f64>,
    pub within_threshold: Option<bool>,
}

impl Verdict {
    pub fn failed(reason: impl Into<String>) -> Self {
        Verdict {
            ok: false,
            reason: reason.into(),
            retransmit_rate_percent: None,
            within_threshold: None,
        }
    }
}

/// Estimate packets transferred from aggregate throughput.
/// Approximation: `floor(bps * duration / (mss * 8))`, floored at one packet.
pub fn estimate_packets(bps: f64, duration_secs: f64, mss: u32) -> u64 {
    let estimate = (bps * duration_secs) / (mss as f64 * 8.0);
    (estimate.floor() as u64).max(1)
}

/// Decide a run from its metric record.
///
/// A missing record (parse failure) is inconclusive, not a throughput
/// failure. When a retransmit count and a throughput figure are both
/// available, the retransmit rate is estimated and compared -- inclusively --
/// against the threshold.
pub fn decide(record: Option<&MetricRecord>, threshold_percent: f64) -> Verdict {
    let Some(record) = record else {
        warn!("no measurement report parsed for analysis");
        return Verdict::failed("no data parsed");
    };

    for line in record.render_lines() {
        info!("{line}");
    }

    let mut retransmit_rate_percent = None;
    let mut within_threshold = None;
    if let (Some(retransmits), Some(bps)) = (record.retransmits, record.best_bps()) {
        let duration = record.duration_secs.unwrap_or(FALLBACK_DURATION_SECS);
        let packets = estimate_packets(bps, duration, record.mss);
        let rate = retransmits as f64 / packets as f64 * 100.0;
        let within = rate <= threshold_percent;
        if within {
            info!(
                rate_percent = rate,
                threshold_percent, "retransmit rate within threshold"
            );
        } else {
            warn!(
                rate_percent = rate,
                threshold_percent, "retransmit rate exceeds threshold"
            );
        }
        retransmit_rate_percent = Some(rate);
        within_threshold = Some(within);
    }

    Verdict {
        ok: true,
        reason: "results displayed".into(),
        retransmit_rate_percent,
        within_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throughput::iperf::{summarize, DEFAULT_MSS};

    fn record(
        retransmits: Option<u64>,
        combined_bps: Option<f64>,
        duration_secs: Option<f64>,
        mss: u32,
    ) -> MetricRecord {
        MetricRecord {
            duration_secs,
            sent_bps: None,
            received_bps: None,
            combined_bps,
            retransmits,
            loss_percent: None,
            jitter_ms: None,
            mss,
        }
    }

    #[test]
    fn missing_record_is_inconclusive() {
        let verdict = decide(None, 0.001);
        assert!(!verdict.ok);
        assert_eq!(verdict.reason, "no data parsed");
        assert_eq!(verdict.retransmit_rate_percent, None);
    }

    #[test]
    fn parsed_record_always_reports_ok() {
        let r = record(Some(1_000_000), Some(1e9), Some(30.0), DEFAULT_MSS);
        let verdict = decide(Some(&r), 0.001);
        assert!(verdict.ok);
        assert_eq!(verdict.reason, "results displayed");
        // Advisory comparison still fires.
        assert_eq!(verdict.within_threshold, Some(false));
    }

    #[test]
    fn packet_estimate_matches_the_formula() {
        // floor(1e9 * 30 / (1448 * 8)) = floor(2589779.0055...) = 2589779
        assert_eq!(estimate_packets(1e9, 30.0, 1448), 2_589_779);
        // Degenerate inputs floor at one packet.
        assert_eq!(estimate_packets(0.0, 30.0, 1448), 1);
        assert_eq!(estimate_packets(10.0, 0.1, 1448), 1);
    }

    #[test]
    fn rate_uses_estimate_and_is_inclusive_at_the_boundary() {
        // bps=8000, duration=1s, mss=1000 -> exactly 1 packet; 1 retransmit
        // -> rate = 100%.
        let r = record(Some(1), Some(8000.0), Some(1.0), 1000);

        let verdict = decide(Some(&r), 100.0);
        assert_eq!(verdict.retransmit_rate_percent, Some(100.0));
        assert_eq!(verdict.within_threshold, Some(true));

        let verdict = decide(Some(&r), 99.999);
        assert_eq!(verdict.within_threshold, Some(false));
        // Still ok: threshold excess is advisory.
        assert!(verdict.ok);
    }

    #[test]
    fn duration_and_mss_defaults_apply() {
        // No duration -> 30s assumed; mss from record.
        let r = record(Some(0), Some(1e6), None, DEFAULT_MSS);
        let verdict = decide(Some(&r), 0.001);
        // 0 retransmits over any estimate is rate 0, within threshold.
        assert_eq!(verdict.retransmit_rate_percent, Some(0.0));
        assert_eq!(verdict.within_threshold, Some(true));
    }

    #[test]
    fn no_rate_without_retransmits_or_throughput() {
        let r = record(None, Some(1e9), Some(30.0), DEFAULT_MSS);
        let verdict = decide(Some(&r), 0.001);
        assert!(verdict.ok);
        assert_eq!(verdict.retransmit_rate_percent, None);
        assert_eq!(verdict.within_threshold, None);

        let r = record(Some(3), None, Some(30.0), DEFAULT_MSS);
        let verdict = decide(Some(&r), 0.001);
        assert_eq!(verdict.retransmit_rate_percent, None);
    }

    #[test]
    fn summarize_then_decide_is_deterministic() {
        let raw = r#"{
            "start": { "tcp_mss": 1448 },
            "end": { "sum_sent": { "seconds": 30.0, "bits_per_second": 1e9, "retransmits": 2 } }
        }"#;
        let first = decide(summarize(raw).as_ref(), 0.001);
        let second = decide(summarize(raw).as_ref(), 0.001);
        assert_eq!(first, second);
        assert!(first.ok);
    }
}
