//! Per-kind handler implementations.

use super::{
    ChannelTest, CounterCheckParams, CpuLoadedParams, IperfParams, MtuProbeParams, SequenceParams,
    TestContext, TestReport, WindowSweepParams,
};
use crate::probes::icmp;
use crate::report;
use crate::system::{self, diag};
use crate::throughput::decision::{self, Verdict};
use crate::throughput::iperf;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::{info, warn};

/// Grace period the CPU load generator gets after the measurement before it
/// is killed.
const LOAD_GRACE: Duration = Duration::from_secs(2);

/// Run one measurement leg against the context's channel: invoke the tool,
/// persist the raw report, summarize, decide.
async fn run_measurement(
    ctx: &TestContext<'_>,
    params: &IperfParams,
    prefix: &str,
) -> Result<(Verdict, PathBuf)> {
    let request = params.to_request(ctx.channel);
    let invocation = request.to_invocation(&ctx.tools.iperf3);
    info!(cmd = %invocation, "running measurement");

    let artifact = report::artifact_path(&ctx.outdir, prefix);
    match system::run_capture(&invocation).await {
        Ok(output) => {
            let text = if output.stdout.is_empty() {
                &output.stderr
            } else {
                &output.stdout
            };
            report::save(&artifact, text)?;
            let record = iperf::summarize(&output.stdout);
            Ok((
                decision::decide(record.as_ref(), ctx.threshold_percent),
                artifact,
            ))
        }
        Err(e) => {
            warn!("measurement tool failed to start: {e:#}");
            report::save(&artifact, &format!("{e:#}\n"))?;
            Ok((
                Verdict::failed(format!("measurement failed to start: {e}")),
                artifact,
            ))
        }
    }
}

/// Link Speed & Duplex: surface the ethtool settings lines that matter.
pub(super) async fn link_status(ctx: &TestContext<'_>) -> Result<TestReport> {
    let iface = &ctx.channel.interface;
    match diag::link_settings(&ctx.tools.ethtool, iface).await {
        Ok(out) if out.success() => {
            let mut lines = Vec::new();
            for line in out.stdout.lines() {
                let line = line.trim();
                if line.starts_with("Speed:")
                    || line.starts_with("Duplex:")
                    || line.starts_with("Link detected:")
                {
                    info!(iface = %iface, "{line}");
                    lines.push(line.to_string());
                }
            }
            let details = if lines.is_empty() {
                "link info displayed".to_string()
            } else {
                lines.join("; ")
            };
            Ok(TestReport {
                ok: true,
                details,
                artifact: None,
            })
        }
        Ok(out) => Ok(TestReport {
            ok: false,
            details: format!(
                "ethtool exited with {}: {}",
                out.exit_code,
                out.stderr.trim()
            ),
            artifact: None,
        }),
        Err(e) => Ok(TestReport {
            ok: false,
            details: format!("ethtool unavailable: {e}"),
            artifact: None,
        }),
    }
}

#[async_trait]
impl ChannelTest for MtuProbeParams {
    async fn run(&self, ctx: &TestContext<'_>) -> Result<TestReport> {
        let iface = &ctx.channel.interface;
        let current = diag::interface_mtu(&ctx.tools.ip, iface)
            .await
            .ok()
            .flatten();
        info!(iface = %iface, current_mtu = ?current, "starting MTU validation");

        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for profile in &self.profiles {
            if self.set_local_mtu {
                match diag::set_mtu(&ctx.tools.ip, iface, profile.mtu).await {
                    Ok(0) => info!(iface = %iface, mtu = profile.mtu, "MTU set"),
                    Ok(code) => warn!(iface = %iface, mtu = profile.mtu, code, "MTU set refused"),
                    Err(e) => warn!(iface = %iface, "MTU set failed: {e:#}"),
                }
            }

            match icmp::probe_payload_sizes(&ctx.tools.ping, ctx.channel.remote_ip, &profile.payloads)
                .await
            {
                Ok(probe) if probe.ok => {
                    info!(mtu = profile.mtu, payload = probe.payload_bytes, "MTU probe passed");
                    passed.push(format!(
                        "mtu {}: ok (payload {} bytes)",
                        profile.mtu, probe.payload_bytes
                    ));
                }
                Ok(probe) => {
                    warn!(mtu = profile.mtu, payload = probe.payload_bytes, "MTU probe failed");
                    failed.push(format!(
                        "mtu {}: fail (max payload {} bytes)",
                        profile.mtu, probe.payload_bytes
                    ));
                }
                Err(e) => {
                    warn!(mtu = profile.mtu, "MTU probe error: {e:#}");
                    failed.push(format!("mtu {}: probe error: {e}", profile.mtu));
                }
            }
        }

        if self.set_local_mtu {
            match diag::set_mtu(&ctx.tools.ip, iface, self.reset_mtu).await {
                Ok(_) => info!(iface = %iface, mtu = self.reset_mtu, "MTU reset"),
                Err(e) => warn!(iface = %iface, "MTU reset failed: {e:#}"),
            }
        }

        let ok = failed.is_empty();
        let details = if ok {
            passed.join("; ")
        } else {
            failed.join("; ")
        };
        Ok(TestReport {
            ok,
            details,
            artifact: None,
        })
    }
}

#[async_trait]
impl ChannelTest for CounterCheckParams {
    async fn run(&self, ctx: &TestContext<'_>) -> Result<TestReport> {
        let iface = &ctx.channel.interface;
        let before = match diag::link_stats(&ctx.tools.ethtool, iface).await {
            Ok(out) => out.stdout,
            Err(e) => {
                return Ok(TestReport {
                    ok: false,
                    details: format!("counter snapshot failed: {e}"),
                    artifact: None,
                })
            }
        };

        // Drive traffic so the counters have something to reflect.
        let (_, artifact) = run_measurement(ctx, &self.burst, "counter_burst").await?;

        let after = match diag::link_stats(&ctx.tools.ethtool, iface).await {
            Ok(out) => out.stdout,
            Err(e) => {
                return Ok(TestReport {
                    ok: false,
                    details: format!("counter snapshot failed: {e}"),
                    artifact: Some(artifact),
                })
            }
        };

        let keys: Vec<&str> = self.keys.iter().map(String::as_str).collect();
        let increases = diag::counter_increases(
            &diag::parse_counters(&before),
            &diag::parse_counters(&after),
            &keys,
        );

        if increases.is_empty() {
            Ok(TestReport {
                ok: true,
                details: "no counter increases".into(),
                artifact: Some(artifact),
            })
        } else {
            let list = increases
                .iter()
                .map(|(key, delta)| format!("{key}:+{delta}"))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(TestReport {
                ok: false,
                details: format!("counters increased: {list}"),
                artifact: Some(artifact),
            })
        }
    }
}

#[async_trait]
impl ChannelTest for IperfParams {
    async fn run(&self, ctx: &TestContext<'_>) -> Result<TestReport> {
        let (verdict, artifact) = run_measurement(ctx, self, "run").await?;
        Ok(TestReport {
            ok: verdict.ok,
            details: verdict.reason,
            artifact: Some(artifact),
        })
    }
}

#[async_trait]
impl ChannelTest for WindowSweepParams {
    async fn run(&self, ctx: &TestContext<'_>) -> Result<TestReport> {
        let mut ok = true;
        let mut details = Vec::new();
        for window in &self.windows {
            let label = window.as_deref().unwrap_or("default");
            info!(window = label, "testing window size");
            let params = IperfParams {
                window: window.clone(),
                ..IperfParams::tcp(self.duration_secs, 1)
            };
            let (verdict, _) = run_measurement(ctx, &params, &format!("window_{label}")).await?;
            ok &= verdict.ok;
            details.push(format!("{label}: {}", verdict.reason));
        }
        Ok(TestReport {
            ok,
            details: details.join("; "),
            artifact: None,
        })
    }
}

#[async_trait]
impl ChannelTest for SequenceParams {
    async fn run(&self, ctx: &TestContext<'_>) -> Result<TestReport> {
        let mut ok = true;
        let mut details = Vec::new();
        for leg in &self.legs {
            info!(leg = %leg.label, "running sequence leg");
            let (verdict, _) = run_measurement(ctx, &leg.params, &leg.label).await?;
            ok &= verdict.ok;
            details.push(format!("{}: {}", leg.label, verdict.reason));
        }
        Ok(TestReport {
            ok,
            details: details.join("; "),
            artifact: None,
        })
    }
}

#[async_trait]
impl ChannelTest for CpuLoadedParams {
    async fn run(&self, ctx: &TestContext<'_>) -> Result<TestReport> {
        info!(workers = self.workers, "starting CPU load generator");
        let load = tokio::process::Command::new(&ctx.tools.stress_ng)
            .arg("--cpu")
            .arg(self.workers.to_string())
            .arg("--timeout")
            .arg(format!("{}s", self.measurement.duration_secs))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let load = match load {
            Ok(child) => Some(child),
            Err(e) => {
                warn!("CPU load generator unavailable: {e}");
                None
            }
        };

        let (verdict, artifact) = run_measurement(ctx, &self.measurement, "loaded").await?;

        // The generator's own --timeout should end it with the measurement;
        // kill it if it outlives the grace period.
        if let Some(mut child) = load {
            match tokio::time::timeout(LOAD_GRACE, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    if let Err(e) = child.start_kill() {
                        warn!("failed to kill CPU load generator: {e}");
                    }
                    let _ = child.wait().await;
                }
            }
        }

        Ok(TestReport {
            ok: verdict.ok,
            details: verdict.reason,
            artifact: Some(artifact),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, ToolPaths};
    use std::os::unix::fs::PermissionsExt;

    const REPORT: &str = r#"{"start":{"tcp_mss":1448},"end":{"sum_sent":{"seconds":1.0,"bits_per_second":1e9,"retransmits":0}}}"#;

    fn write_script(dir: &std::path::Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn channel() -> ChannelConfig {
        ChannelConfig {
            interface: "lo".into(),
            local_ip: "127.0.0.1".parse().unwrap(),
            remote_ip: "127.0.0.1".parse().unwrap(),
            remote_port: 5201,
        }
    }

    #[tokio::test]
    async fn iperf_run_persists_an_artifact_and_passes() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            iperf3: write_script(dir.path(), "fake-iperf3", &format!("printf '%s' '{REPORT}'")),
            ..ToolPaths::default()
        };
        let channel = channel();
        let ctx = TestContext {
            channel: &channel,
            tools: &tools,
            threshold_percent: 0.001,
            outdir: dir.path().join("out"),
        };
        let report = IperfParams::tcp(1, 1).run(&ctx).await.unwrap();
        assert!(report.ok);
        let artifact = report.artifact.unwrap();
        assert!(artifact.exists());
        assert!(std::fs::read_to_string(artifact)
            .unwrap()
            .contains("sum_sent"));
    }

    #[tokio::test]
    async fn iperf_run_with_garbage_output_fails_inconclusively() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            iperf3: write_script(
                dir.path(),
                "fake-iperf3",
                "echo 'iperf3: error - unable to connect' >&2; exit 1",
            ),
            ..ToolPaths::default()
        };
        let channel = channel();
        let ctx = TestContext {
            channel: &channel,
            tools: &tools,
            threshold_percent: 0.001,
            outdir: dir.path().join("out"),
        };
        let report = IperfParams::tcp(1, 1).run(&ctx).await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.details, "no data parsed");
        // stderr is still persisted for inspection.
        let artifact = report.artifact.unwrap();
        assert!(std::fs::read_to_string(artifact)
            .unwrap()
            .contains("unable to connect"));
    }

    #[tokio::test]
    async fn counter_check_fails_when_error_counters_increase() {
        let dir = tempfile::tempdir().unwrap();
        // First -S call reports 0 errors, subsequent calls report 3.
        let marker = dir.path().join("called");
        let ethtool = write_script(
            dir.path(),
            "fake-ethtool",
            &format!(
                "if [ -e {m} ]; then echo ' rx_errors: 3'; else touch {m}; echo ' rx_errors: 0'; fi",
                m = marker.display()
            ),
        );
        let tools = ToolPaths {
            iperf3: write_script(dir.path(), "fake-iperf3", &format!("printf '%s' '{REPORT}'")),
            ethtool,
            ..ToolPaths::default()
        };
        let channel = channel();
        let ctx = TestContext {
            channel: &channel,
            tools: &tools,
            threshold_percent: 0.001,
            outdir: dir.path().join("out"),
        };
        let report = CounterCheckParams::default().run(&ctx).await.unwrap();
        assert!(!report.ok);
        assert!(report.details.contains("rx_errors:+3"));
    }

    #[tokio::test]
    async fn sequence_runs_every_leg() {
        let dir = tempfile::tempdir().unwrap();
        let count = dir.path().join("count");
        let tools = ToolPaths {
            iperf3: write_script(
                dir.path(),
                "fake-iperf3",
                &format!("echo x >> {c}; printf '%s' '{REPORT}'", c = count.display()),
            ),
            ..ToolPaths::default()
        };
        let channel = channel();
        let ctx = TestContext {
            channel: &channel,
            tools: &tools,
            threshold_percent: 0.001,
            outdir: dir.path().join("out"),
        };
        let params = SequenceParams {
            legs: vec![
                super::super::SequenceLeg::new("a", IperfParams::tcp(1, 1)),
                super::super::SequenceLeg::new("b", IperfParams::udp(1, "100M")),
            ],
        };
        let report = params.run(&ctx).await.unwrap();
        assert!(report.ok);
        assert!(report.details.contains("a:"));
        assert!(report.details.contains("b:"));
        assert_eq!(std::fs::read_to_string(count).unwrap().lines().count(), 2);
    }
}
