//! Concurrent per-channel measurement batches: spawn-all, then join-all.

use super::decision::{self, Verdict};
use super::iperf;
use crate::report;
use crate::system::Invocation;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{info, warn};

/// One batch member: the measurement invocation plus where its raw report
/// is persisted.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub invocation: Invocation,
    pub artifact: PathBuf,
}

/// Per-member result. Always one per submitted item, in submission order.
#[derive(Debug)]
pub struct BatchResult {
    pub verdict: Verdict,
    pub artifact: PathBuf,
}

/// Run all batch members as concurrently executing child processes and wait
/// for every one to finish.
///
/// Every child is started before any is awaited; results come back in
/// submission order regardless of completion order. A member that fails to
/// spawn, exits nonzero, or produces unparsable output yields a failed
/// verdict without affecting its siblings. There is no bound on concurrency
/// beyond the batch size and no timeout beyond whatever duration is baked
/// into each invocation.
pub async fn run_batch(items: &[BatchItem], threshold_percent: f64) -> Vec<BatchResult> {
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        info!(cmd = %item.invocation, "starting concurrent measurement");
        let spawned = tokio::process::Command::new(&item.invocation.program)
            .args(&item.invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        children.push(spawned);
    }

    let mut results = Vec::with_capacity(items.len());
    for (item, child) in items.iter().zip(children) {
        let verdict = match child {
            Ok(child) => match child.wait_with_output().await {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                    let text = if stdout.is_empty() { &stderr } else { &stdout };
                    if let Err(e) = report::save(&item.artifact, text) {
                        warn!(
                            artifact = %item.artifact.display(),
                            "failed to persist measurement output: {e:#}"
                        );
                    }
                    decision::decide(iperf::summarize(&stdout).as_ref(), threshold_percent)
                }
                Err(e) => {
                    warn!(cmd = %item.invocation, "failed to collect measurement output: {e}");
                    Verdict::failed(format!("collection failed: {e}"))
                }
            },
            Err(e) => {
                warn!(cmd = %item.invocation, "failed to spawn measurement process: {e}");
                Verdict::failed(format!("spawn failed: {e}"))
            }
        };
        results.push(BatchResult {
            verdict,
            artifact: item.artifact.clone(),
        });
    }
    results
}
