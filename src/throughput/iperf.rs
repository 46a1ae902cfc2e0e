//! iperf3 JSON report decode and canonical metric extraction.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MSS: u32 = 1448;

/// Raw iperf3 JSON report (subset of fields we care about).
/// Every section and field is optional -- the decode tolerates partial
/// reports from failed or interrupted runs.
#[derive(Debug, Default, Deserialize)]
pub struct IperfReport {
    #[serde(default)]
    pub start: Option<ReportStart>,
    #[serde(default)]
    pub end: Option<ReportEnd>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportStart {
    #[serde(default)]
    pub tcp_mss: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportEnd {
    #[serde(default)]
    pub sum: Option<ReportSum>,
    #[serde(default)]
    pub sum_sent: Option<ReportSum>,
    #[serde(default)]
    pub sum_received: Option<ReportSum>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportSum {
    #[serde(default)]
    pub seconds: Option<f64>,
    #[serde(default)]
    pub bits_per_second: Option<f64>,
    #[serde(default)]
    pub retransmits: Option<u64>,
    #[serde(default)]
    pub lost_percent: Option<f64>,
    #[serde(default)]
    pub jitter_ms: Option<f64>,
    #[serde(default)]
    pub lost_packets: Option<u64>,
    #[serde(default)]
    pub packets: Option<u64>,
}

/// Canonical metric record distilled from one measurement run.
/// Read-only; consumed immediately by the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub duration_secs: Option<f64>,
    pub sent_bps: Option<f64>,
    pub received_bps: Option<f64>,
    pub combined_bps: Option<f64>,
    /// Present whenever the sender summary is, defaulting to 0 when the
    /// report omits the field (UDP runs).
    pub retransmits: Option<u64>,
    pub loss_percent: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub mss: u32,
}

/// Parse raw measurement output into a metric record.
///
/// Returns `None` when the text is not a JSON report. A report that parses
/// but carries no usable sections yields a record of absent fields, which
/// the decision engine treats as displayable-but-unjudgeable.
pub fn summarize(raw: &str) -> Option<MetricRecord> {
    let report: IperfReport = serde_json::from_str(raw).ok()?;
    Some(MetricRecord::from_report(&report))
}

impl MetricRecord {
    pub fn from_report(report: &IperfReport) -> Self {
        let end = report.end.as_ref();
        let sum = end.and_then(|e| e.sum.as_ref());
        let sum_sent = end.and_then(|e| e.sum_sent.as_ref());
        let sum_received = end.and_then(|e| e.sum_received.as_ref());

        // Duration preference: sum, then sum_sent, then sum_received.
        let duration_secs = sum
            .and_then(|s| s.seconds)
            .or_else(|| sum_sent.and_then(|s| s.seconds))
            .or_else(|| sum_received.and_then(|s| s.seconds));

        let sent_bps = sum_sent.and_then(|s| s.bits_per_second);
        let retransmits = sum_sent.map(|s| s.retransmits.unwrap_or(0));
        let received_bps = sum_received.and_then(|s| s.bits_per_second);
        let combined_bps = sum.and_then(|s| s.bits_per_second);

        let mut loss_percent = sum.and_then(|s| s.lost_percent);
        // A loss figure recomputed from raw packet counts is authoritative
        // over the reported percentage.
        if let Some(s) = sum {
            if let (Some(lost), Some(packets)) = (s.lost_packets, s.packets) {
                if packets > 0 {
                    loss_percent = Some(lost as f64 / packets as f64 * 100.0);
                }
            }
        }
        let jitter_ms = sum.and_then(|s| s.jitter_ms);

        let mss = report
            .start
            .as_ref()
            .and_then(|s| s.tcp_mss)
            .unwrap_or(DEFAULT_MSS);

        MetricRecord {
            duration_secs,
            sent_bps,
            received_bps,
            combined_bps,
            retransmits,
            loss_percent,
            jitter_ms,
            mss,
        }
    }

    /// Throughput figure preference: combined, then sent, then received.
    pub fn best_bps(&self) -> Option<f64> {
        self.combined_bps.or(self.sent_bps).or(self.received_bps)
    }

    /// Human-readable lines for terminal display and summary files.
    pub fn render_lines(&self) -> Vec<String> {
        use crate::report::pretty_bps;
        let mut lines = Vec::new();
        if let Some(bps) = self.sent_bps {
            lines.push(format!("Sum sent: {}", pretty_bps(bps)));
        }
        if let Some(bps) = self.received_bps {
            lines.push(format!("Sum received: {}", pretty_bps(bps)));
        }
        if let Some(bps) = self.combined_bps {
            lines.push(format!("Throughput: {}", pretty_bps(bps)));
        }
        if let Some(retransmits) = self.retransmits {
            lines.push(format!("Retransmits: {}", retransmits));
        }
        if let Some(loss) = self.loss_percent {
            lines.push(format!("UDP Loss %: {:.3}%", loss));
        }
        if let Some(jitter) = self.jitter_ms {
            lines.push(format!("Jitter: {:.3} ms", jitter));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_REPORT: &str = r#"{
        "start": { "tcp_mss": 1460 },
        "end": {
            "sum_sent": { "seconds": 30.01, "bits_per_second": 9.41e9, "retransmits": 12 },
            "sum_received": { "seconds": 30.01, "bits_per_second": 9.39e9 }
        }
    }"#;

    const UDP_REPORT: &str = r#"{
        "start": {},
        "end": {
            "sum": {
                "seconds": 30.0,
                "bits_per_second": 4.97e8,
                "jitter_ms": 0.042,
                "lost_percent": 1.5,
                "lost_packets": 10,
                "packets": 4000
            }
        }
    }"#;

    #[test]
    fn extracts_tcp_sender_fields() {
        let record = summarize(TCP_REPORT).unwrap();
        assert_eq!(record.sent_bps, Some(9.41e9));
        assert_eq!(record.received_bps, Some(9.39e9));
        assert_eq!(record.retransmits, Some(12));
        assert_eq!(record.mss, 1460);
        assert_eq!(record.duration_secs, Some(30.01));
        assert_eq!(record.combined_bps, None);
    }

    #[test]
    fn recomputed_loss_overrides_reported_percentage() {
        let record = summarize(UDP_REPORT).unwrap();
        // 10 / 4000 * 100, not the reported 1.5.
        assert_eq!(record.loss_percent, Some(0.25));
        assert_eq!(record.jitter_ms, Some(0.042));
        assert_eq!(record.combined_bps, Some(4.97e8));
    }

    #[test]
    fn reported_loss_survives_when_packet_counts_are_absent() {
        let raw = r#"{"end":{"sum":{"bits_per_second":1e8,"lost_percent":1.5}}}"#;
        let record = summarize(raw).unwrap();
        assert_eq!(record.loss_percent, Some(1.5));
    }

    #[test]
    fn zero_packet_count_does_not_override() {
        let raw = r#"{"end":{"sum":{"lost_percent":1.5,"lost_packets":0,"packets":0}}}"#;
        let record = summarize(raw).unwrap();
        assert_eq!(record.loss_percent, Some(1.5));
    }

    #[test]
    fn duration_falls_back_in_priority_order() {
        let raw = r#"{"end":{"sum_sent":{"seconds":10.0},"sum_received":{"seconds":20.0}}}"#;
        assert_eq!(summarize(raw).unwrap().duration_secs, Some(10.0));

        let raw = r#"{"end":{"sum_received":{"seconds":20.0}}}"#;
        assert_eq!(summarize(raw).unwrap().duration_secs, Some(20.0));

        let raw = r#"{"end":{"sum":{"seconds":5.0},"sum_sent":{"seconds":10.0}}}"#;
        assert_eq!(summarize(raw).unwrap().duration_secs, Some(5.0));
    }

    #[test]
    fn retransmits_default_to_zero_only_when_sender_summary_exists() {
        let raw = r#"{"end":{"sum_sent":{"bits_per_second":1e9}}}"#;
        assert_eq!(summarize(raw).unwrap().retransmits, Some(0));

        let raw = r#"{"end":{"sum_received":{"bits_per_second":1e9}}}"#;
        assert_eq!(summarize(raw).unwrap().retransmits, None);
    }

    #[test]
    fn mss_defaults_when_start_is_missing_or_bare() {
        let record = summarize(r#"{"end":{}}"#).unwrap();
        assert_eq!(record.mss, DEFAULT_MSS);

        let record = summarize(r#"{"start":{},"end":{}}"#).unwrap();
        assert_eq!(record.mss, DEFAULT_MSS);
    }

    #[test]
    fn malformed_input_yields_no_record() {
        assert!(summarize("").is_none());
        assert!(summarize("iperf3: error - unable to connect").is_none());
        assert!(summarize("{ truncated").is_none());
    }

    #[test]
    fn empty_object_yields_an_empty_record() {
        let record = summarize("{}").unwrap();
        assert_eq!(record.best_bps(), None);
        assert_eq!(record.retransmits, None);
        assert_eq!(record.mss, DEFAULT_MSS);
    }

    #[test]
    fn best_bps_prefers_combined_then_sent() {
        let record = MetricRecord {
            duration_secs: None,
            sent_bps: Some(2.0),
            received_bps: Some(3.0),
            combined_bps: Some(1.0),
            retransmits: None,
            loss_percent: None,
            jitter_ms: None,
            mss: DEFAULT_MSS,
        };
        assert_eq!(record.best_bps(), Some(1.0));

        let record = MetricRecord {
            combined_bps: None,
            ..record
        };
        assert_eq!(record.best_bps(), Some(2.0));
    }

    #[test]
    fn identical_input_yields_identical_records() {
        assert_eq!(summarize(TCP_REPORT), summarize(TCP_REPORT));
    }
}
