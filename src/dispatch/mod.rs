//! Test dispatch: single-test mode and run-all mode.
//!
//! A single control task drives everything here; the only point of real
//! parallelism is the concurrent batch coordinator, which fans out one
//! child process per channel for concurrency-eligible tests.

pub mod summary;

use crate::catalog::{ChannelTest, TestContext, TestDefinition};
use crate::config::{ChannelConfig, RunConfig};
use crate::probes::tcp;
use crate::report;
use crate::system::diag;
use crate::throughput::concurrent::{self, BatchItem};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use summary::{Outcome, OutcomeStatus, RunSummary};
use tracing::{info, warn};

/// Options an operator chooses for a run-all pass.
#[derive(Debug, Clone)]
pub struct RunAllOptions {
    /// Run concurrency-eligible tests across channels in parallel.
    pub parallel: bool,
    pub results_root: PathBuf,
}

async fn listener_reachable(channel: &ChannelConfig) -> bool {
    let ok = tcp::check_reachable(
        channel.remote_ip,
        channel.remote_port,
        tcp::DEFAULT_PROBE_TIMEOUT,
    )
    .await;
    if !ok {
        warn!(
            remote = %channel.remote_ip,
            port = channel.remote_port,
            "cannot connect -- ensure the measurement listener is running on END"
        );
    }
    ok
}

fn skipped(def: &TestDefinition, channel: &ChannelConfig) -> Outcome {
    Outcome {
        test: def.name.into(),
        channel: channel.interface.clone(),
        status: OutcomeStatus::Skipped,
        detail: "measurement listener unreachable".into(),
        artifact: None,
    }
}

/// Run one test's handler against one channel.
async fn run_channel(
    def: &TestDefinition,
    config: &RunConfig,
    channel: &ChannelConfig,
    test_dir: &Path,
) -> Outcome {
    let ctx = TestContext {
        channel,
        tools: &config.tools,
        threshold_percent: config.threshold_percent,
        outdir: test_dir.join(&channel.interface),
    };
    match def.kind.run(&ctx).await {
        Ok(report) => Outcome {
            test: def.name.into(),
            channel: channel.interface.clone(),
            status: if report.ok {
                OutcomeStatus::Pass
            } else {
                OutcomeStatus::Fail
            },
            detail: report.details,
            artifact: report.artifact,
        },
        Err(e) => {
            warn!(test = def.name, iface = %channel.interface, "handler error: {e:#}");
            Outcome {
                test: def.name.into(),
                channel: channel.interface.clone(),
                status: OutcomeStatus::Fail,
                detail: format!("handler error: {e:#}"),
                artifact: None,
            }
        }
    }
}

/// Single-test mode: the selected test runs once per configured channel,
/// sequentially, each gated by a reachability precheck. Unreachable channels
/// are skipped, not failed.
pub async fn run_single(
    def: &TestDefinition,
    config: &RunConfig,
    outdir: &Path,
) -> Vec<Outcome> {
    info!(test = def.name, "running single test");
    let mut outcomes = Vec::new();
    for channel in &config.channels {
        info!(iface = %channel.interface, "testing");
        if !listener_reachable(channel).await {
            warn!(iface = %channel.interface, "skipping -- measurement listener unreachable");
            outcomes.push(skipped(def, channel));
            continue;
        }
        outcomes.push(run_channel(def, config, channel, outdir).await);
    }
    outcomes
}

/// Run-all mode: walk the whole catalog in order, bracketing every test with
/// per-channel counter snapshots and persisting artifacts plus a final
/// summary under a fresh run directory.
pub async fn run_all(
    catalog: &[TestDefinition],
    config: &RunConfig,
    options: &RunAllOptions,
) -> Result<(RunSummary, PathBuf)> {
    let run_dir = report::run_dir(&options.results_root);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create {}", run_dir.display()))?;
    info!(dir = %run_dir.display(), "results will be saved");

    let mut summary = RunSummary::new(config.channels.len());

    for def in catalog {
        info!(id = def.id, test = def.name, "starting test");
        let test_dir = report::test_dir(&run_dir, def.id, def.name);
        if let Err(e) = write_test_config(&test_dir, def, config) {
            warn!(test = def.name, "failed to write test config: {e:#}");
        }

        snapshot_counters(config, &test_dir, "before").await;

        let concurrent_eligible =
            config.channels.len() > 1 && options.parallel && def.concurrent_eligible;
        if concurrent_eligible {
            run_concurrent(def, config, &test_dir, &mut summary).await;
        } else {
            run_sequential(def, config, &test_dir, &mut summary).await;
        }

        snapshot_counters(config, &test_dir, "after").await;
    }

    let summary_path = run_dir.join("overall_summary.txt");
    report::save(&summary_path, &summary.render())?;
    info!(
        passed = summary.passed(),
        failed = summary.failed(),
        skipped = summary.skipped(),
        summary = %summary_path.display(),
        "all tests completed"
    );
    Ok((summary, run_dir))
}

/// One concurrent batch: a RunRequest per reachable channel, fanned out
/// through the coordinator; results come back in channel order.
async fn run_concurrent(
    def: &TestDefinition,
    config: &RunConfig,
    test_dir: &Path,
    summary: &mut RunSummary,
) {
    let mut items = Vec::new();
    let mut batch_channels = Vec::new();
    for (index, channel) in config.channels.iter().enumerate() {
        if !listener_reachable(channel).await {
            warn!(iface = %channel.interface, "skipping -- measurement listener unreachable");
            summary.record(skipped(def, channel));
            continue;
        }
        let Some(request) = def.run_request(channel) else {
            // Eligible entries are single measurement runs; anything else
            // falls back to its sequential handler.
            summary.record(run_channel(def, config, channel, test_dir).await);
            continue;
        };
        let outdir = test_dir.join(&channel.interface);
        let prefix = format!("{}_ch{}", report::sanitize(def.name), index + 1);
        items.push(BatchItem {
            invocation: request.to_invocation(&config.tools.iperf3),
            artifact: report::artifact_path(&outdir, &prefix),
        });
        batch_channels.push(channel);
    }

    let results = concurrent::run_batch(&items, config.threshold_percent).await;
    for (channel, result) in batch_channels.iter().zip(results) {
        info!(
            iface = %channel.interface,
            artifact = %result.artifact.display(),
            "results saved"
        );
        summary.record(Outcome {
            test: def.name.into(),
            channel: channel.interface.clone(),
            status: if result.verdict.ok {
                OutcomeStatus::Pass
            } else {
                OutcomeStatus::Fail
            },
            detail: result.verdict.reason,
            artifact: Some(result.artifact),
        });
    }
}

async fn run_sequential(
    def: &TestDefinition,
    config: &RunConfig,
    test_dir: &Path,
    summary: &mut RunSummary,
) {
    for channel in &config.channels {
        if !listener_reachable(channel).await {
            warn!(iface = %channel.interface, "skipping -- measurement listener unreachable");
            summary.record(skipped(def, channel));
            continue;
        }
        info!(iface = %channel.interface, test = def.name, "running");
        let outcome = run_channel(def, config, channel, test_dir).await;

        let summary_path = test_dir.join(&channel.interface).join("test_summary.txt");
        if let Err(e) = report::save(&summary_path, &render_channel_summary(def, channel, &outcome))
        {
            warn!(iface = %channel.interface, "failed to write channel summary: {e:#}");
        }
        summary.record(outcome);
    }
}

fn render_channel_summary(
    def: &TestDefinition,
    channel: &ChannelConfig,
    outcome: &Outcome,
) -> String {
    format!(
        "Test: {}\nInterface: {}\nResult: {}\nDetails: {}\nTime: {}\n",
        def.name,
        channel.interface,
        outcome.status,
        outcome.detail,
        chrono::Local::now()
    )
}

fn write_test_config(test_dir: &Path, def: &TestDefinition, config: &RunConfig) -> Result<()> {
    let mut text = format!(
        "Test: {}\nDescription: {}\nTime: {}\nChannels: {}\n",
        def.name,
        def.description,
        chrono::Local::now(),
        config.channels.len()
    );
    for (index, channel) in config.channels.iter().enumerate() {
        text.push_str(&format!(
            "\nChannel {}:\n  Interface: {}\n  Source IP: {}\n  End IP: {}\n  Server Port: {}\n",
            index + 1,
            channel.interface,
            channel.local_ip,
            channel.remote_ip,
            channel.remote_port
        ));
    }
    report::save(&test_dir.join("test_config.txt"), &text)
}

/// Bracketing instrumentation: persist per-channel error-counter snapshots.
/// Not part of the pass/fail decision.
async fn snapshot_counters(config: &RunConfig, test_dir: &Path, phase: &str) {
    for channel in &config.channels {
        match diag::link_stats(&config.tools.ethtool, &channel.interface).await {
            Ok(out) => {
                let path = test_dir.join(format!("ethtool_{}_{}.txt", phase, channel.interface));
                if let Err(e) = report::save(&path, &out.stdout) {
                    warn!(iface = %channel.interface, "failed to persist counter snapshot: {e:#}");
                }
            }
            Err(e) => {
                warn!(iface = %channel.interface, "counter snapshot failed: {e:#}");
            }
        }
    }
}
