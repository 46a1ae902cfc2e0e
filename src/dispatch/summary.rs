//! Run-level outcome aggregation.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;

/// How a (test, channel) pair concluded. Skips are recorded distinctly --
/// an unreachable endpoint is neither a pass nor a fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    Pass,
    Fail,
    Skipped,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Pass => write!(f, "PASS"),
            OutcomeStatus::Fail => write!(f, "FAIL"),
            OutcomeStatus::Skipped => write!(f, "SKIP"),
        }
    }
}

/// One recorded (test, channel) outcome. Immutable once recorded.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub test: String,
    pub channel: String,
    pub status: OutcomeStatus,
    pub detail: String,
    pub artifact: Option<PathBuf>,
}

/// Accumulates outcomes during a run-all pass; finalized and emitted once
/// at the end.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub channel_count: usize,
    pub outcomes: Vec<Outcome>,
}

impl RunSummary {
    pub fn new(channel_count: usize) -> Self {
        Self {
            started_at: Local::now(),
            channel_count,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    pub fn passed(&self) -> usize {
        self.count(OutcomeStatus::Pass)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Fail)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    /// passed / total * 100. Run-all never finalizes an empty summary, so
    /// total is nonzero there; an empty summary reports 0.
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.passed() as f64 / self.total() as f64 * 100.0
    }

    /// The overall text summary written at the end of a run.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        out.push_str(&rule);
        out.push_str("\nOVERALL TEST SUMMARY\n");
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!(
            "Test Run: {}\n",
            self.started_at.format("%Y%m%d_%H%M%S")
        ));
        out.push_str(&format!("Total Outcomes: {}\n", self.total()));
        out.push_str(&format!("Total Channels: {}\n\n", self.channel_count));
        out.push_str(&format!("Tests PASSED: {}\n", self.passed()));
        out.push_str(&format!("Tests FAILED: {}\n", self.failed()));
        out.push_str(&format!("Tests SKIPPED: {}\n", self.skipped()));
        out.push_str(&format!("Success Rate: {:.1}%\n\n", self.success_rate()));
        out.push_str("Detailed Results:\n");
        out.push_str(&"-".repeat(60));
        out.push('\n');
        for outcome in &self.outcomes {
            out.push_str(&format!(
                "{:30} [{:10}] : {}\n",
                outcome.test, outcome.channel, outcome.status
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(test: &str, channel: &str, status: OutcomeStatus) -> Outcome {
        Outcome {
            test: test.into(),
            channel: channel.into(),
            status,
            detail: String::new(),
            artifact: None,
        }
    }

    #[test]
    fn counts_and_rate() {
        let mut summary = RunSummary::new(2);
        summary.record(outcome("a", "eth0", OutcomeStatus::Pass));
        summary.record(outcome("a", "eth1", OutcomeStatus::Fail));
        summary.record(outcome("b", "eth0", OutcomeStatus::Pass));
        summary.record(outcome("b", "eth1", OutcomeStatus::Skipped));

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.passed(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.success_rate(), 50.0);
    }

    #[test]
    fn render_lists_every_outcome() {
        let mut summary = RunSummary::new(1);
        summary.record(outcome("TCP Unidirectional", "enp1s0", OutcomeStatus::Pass));
        summary.record(outcome("UDP Line Rate", "enp1s0", OutcomeStatus::Fail));
        let text = summary.render();
        assert!(text.contains("OVERALL TEST SUMMARY"));
        assert!(text.contains("Success Rate: 50.0%"));
        assert!(text.contains("TCP Unidirectional"));
        assert!(text.contains("FAIL"));
    }

    #[test]
    fn empty_summary_reports_zero_rate() {
        let summary = RunSummary::new(1);
        assert_eq!(summary.success_rate(), 0.0);
    }
}
