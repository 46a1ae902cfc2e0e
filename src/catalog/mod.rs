//! The test catalog: an ordered table of test definitions, the per-kind
//! parameter sets, and the capability every kind implements against a
//! single channel. Catalog order defines both listing numbers and run-all
//! execution order.

pub mod handlers;

use crate::config::{ChannelConfig, ToolPaths};
use crate::throughput::{RunRequest, Transport, DEFAULT_DURATION_SECS};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// Everything a handler may consult while running against one channel.
pub struct TestContext<'a> {
    pub channel: &'a ChannelConfig,
    pub tools: &'a ToolPaths,
    pub threshold_percent: f64,
    /// Directory this channel's artifacts land in.
    pub outdir: PathBuf,
}

/// What a handler reports back for one channel.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub ok: bool,
    pub details: String,
    pub artifact: Option<PathBuf>,
}

/// Capability every test kind implements: run against a single channel.
/// Handlers are pure functions of (channel, parameters) -- no terminal
/// interaction, no ambient state.
#[async_trait]
pub trait ChannelTest: Send + Sync {
    async fn run(&self, ctx: &TestContext<'_>) -> Result<TestReport>;
}

/// Parameters for one iperf3 measurement leg.
#[derive(Debug, Clone, Serialize)]
pub struct IperfParams {
    pub transport: Transport,
    pub duration_secs: u32,
    pub streams: u32,
    pub window: Option<String>,
    pub bandwidth: Option<String>,
    pub length: Option<String>,
    pub reverse: bool,
    pub bidir: bool,
    pub interval: Option<f64>,
}

impl IperfParams {
    pub fn tcp(duration_secs: u32, streams: u32) -> Self {
        Self {
            transport: Transport::Tcp,
            duration_secs,
            streams,
            window: None,
            bandwidth: None,
            length: None,
            reverse: false,
            bidir: false,
            interval: None,
        }
    }

    pub fn udp(duration_secs: u32, bandwidth: &str) -> Self {
        Self {
            transport: Transport::Udp,
            bandwidth: Some(bandwidth.into()),
            ..Self::tcp(duration_secs, 1)
        }
    }

    pub fn with_length(mut self, length: &str) -> Self {
        self.length = Some(length.into());
        self
    }

    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn bidirectional(mut self) -> Self {
        self.bidir = true;
        self
    }

    /// Bind this parameter set to a concrete channel.
    pub fn to_request(&self, channel: &ChannelConfig) -> RunRequest {
        RunRequest {
            target: channel.remote_ip,
            duration_secs: self.duration_secs,
            streams: self.streams,
            transport: self.transport,
            bind: Some(channel.local_ip),
            port: Some(channel.remote_port),
            bandwidth: self.bandwidth.clone(),
            length: self.length.clone(),
            reverse: self.reverse,
            bidir: self.bidir,
            window: self.window.clone(),
            interval: self.interval,
        }
    }
}

/// One MTU setting with the DF-ping payload sizes that should fit it.
#[derive(Debug, Clone, Serialize)]
pub struct MtuProfile {
    pub mtu: u32,
    pub payloads: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MtuProbeParams {
    /// When set, the local interface MTU is switched per profile and reset
    /// afterwards; otherwise profiles are probed against whatever is set.
    pub set_local_mtu: bool,
    pub profiles: Vec<MtuProfile>,
    pub reset_mtu: u32,
}

impl Default for MtuProbeParams {
    fn default() -> Self {
        Self {
            set_local_mtu: false,
            profiles: vec![
                MtuProfile {
                    mtu: 1500,
                    payloads: vec![1472],
                },
                MtuProfile {
                    mtu: 9000,
                    payloads: vec![8950, 8972, 8900, 8800],
                },
            ],
            reset_mtu: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterCheckParams {
    /// Traffic driven between the two counter snapshots.
    pub burst: IperfParams,
    pub keys: Vec<String>,
}

impl Default for CounterCheckParams {
    fn default() -> Self {
        Self {
            burst: IperfParams::tcp(10, 1),
            keys: crate::system::diag::ERROR_COUNTER_KEYS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowSweepParams {
    /// None probes the stack default.
    pub windows: Vec<Option<String>>,
    pub duration_secs: u32,
}

impl Default for WindowSweepParams {
    fn default() -> Self {
        Self {
            windows: vec![
                Some("256K".into()),
                Some("512K".into()),
                Some("1M".into()),
                None,
            ],
            duration_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceLeg {
    pub label: String,
    pub params: IperfParams,
}

impl SequenceLeg {
    pub fn new(label: &str, params: IperfParams) -> Self {
        Self {
            label: label.into(),
            params,
        }
    }
}

/// Back-to-back measurement legs against the same channel.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceParams {
    pub legs: Vec<SequenceLeg>,
}

/// A measurement run raced against an ancillary CPU load generator.
#[derive(Debug, Clone, Serialize)]
pub struct CpuLoadedParams {
    pub workers: u32,
    pub measurement: IperfParams,
}

/// The behaviors a catalog entry can map onto, each carrying its own
/// parameter set.
#[derive(Debug, Clone, Serialize)]
pub enum TestKind {
    LinkStatus,
    MtuProbe(MtuProbeParams),
    CounterCheck(CounterCheckParams),
    IperfRun(IperfParams),
    WindowSweep(WindowSweepParams),
    Sequence(SequenceParams),
    CpuLoaded(CpuLoadedParams),
}

#[async_trait]
impl ChannelTest for TestKind {
    async fn run(&self, ctx: &TestContext<'_>) -> Result<TestReport> {
        match self {
            TestKind::LinkStatus => handlers::link_status(ctx).await,
            TestKind::MtuProbe(params) => params.run(ctx).await,
            TestKind::CounterCheck(params) => params.run(ctx).await,
            TestKind::IperfRun(params) => params.run(ctx).await,
            TestKind::WindowSweep(params) => params.run(ctx).await,
            TestKind::Sequence(params) => params.run(ctx).await,
            TestKind::CpuLoaded(params) => params.run(ctx).await,
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone)]
pub struct TestDefinition {
    pub id: usize,
    pub name: &'static str,
    pub description: &'static str,
    /// Safe to run simultaneously across channels without cross-channel
    /// interference.
    pub concurrent_eligible: bool,
    pub kind: TestKind,
}

impl TestDefinition {
    /// The single measurement request this test issues against a channel,
    /// for kinds that are one run. Concurrency-eligible entries are always
    /// such kinds.
    pub fn run_request(&self, channel: &ChannelConfig) -> Option<RunRequest> {
        match &self.kind {
            TestKind::IperfRun(params) => Some(params.to_request(channel)),
            _ => None,
        }
    }
}

/// Built-in catalog, in fixed order.
pub fn builtin() -> Vec<TestDefinition> {
    let d = DEFAULT_DURATION_SECS;
    let defs = vec![
        (
            "Link Speed & Duplex",
            "ethtool link speed & duplex",
            false,
            TestKind::LinkStatus,
        ),
        (
            "MTU/Jumbo Validation",
            "Probe 1500 and 9000 with DF pings",
            false,
            TestKind::MtuProbe(MtuProbeParams::default()),
        ),
        (
            "NIC Error Counter Check",
            "ethtool -S before/after a traffic burst",
            false,
            TestKind::CounterCheck(CounterCheckParams::default()),
        ),
        (
            "TCP Unidirectional (UUT -> END)",
            "Basic TCP client->server",
            true,
            TestKind::IperfRun(IperfParams::tcp(d, 1)),
        ),
        (
            "TCP Parallel (P streams)",
            "Parallel TCP streams",
            true,
            TestKind::IperfRun(IperfParams::tcp(d, 4)),
        ),
        (
            "TCP High (8 streams)",
            "8-stream saturation",
            true,
            TestKind::IperfRun(IperfParams::tcp(d, 8)),
        ),
        (
            "TCP Reverse (END -> UUT)",
            "Reverse -R receive path",
            false,
            TestKind::IperfRun(IperfParams::tcp(d, 1).reversed()),
        ),
        (
            "TCP Bidirectional",
            "Bi-directional TCP",
            false,
            TestKind::IperfRun(IperfParams::tcp(d, 1).bidirectional()),
        ),
        (
            "TCP Window Sweep",
            "Window sizes sweep",
            false,
            TestKind::WindowSweep(WindowSweepParams::default()),
        ),
        (
            "TCP Retransmission Monitor",
            "Long-run retransmission check",
            false,
            TestKind::IperfRun(IperfParams::tcp(60, 4)),
        ),
        (
            "UDP Low (100M)",
            "UDP 100 Mbps",
            true,
            TestKind::IperfRun(IperfParams::udp(d, "100M").with_length("1470")),
        ),
        (
            "UDP Mid (500M)",
            "UDP 500 Mbps",
            true,
            TestKind::IperfRun(IperfParams::udp(d, "500M").with_length("1470")),
        ),
        (
            "UDP Line Rate",
            "UDP near line-rate",
            true,
            TestKind::IperfRun(IperfParams::udp(d, "1G")),
        ),
        (
            "UDP Small Packet (256B)",
            "PPS small packets",
            true,
            TestKind::IperfRun(IperfParams::udp(d, "1G").with_length("256")),
        ),
        (
            "UDP Large Packet (1470B)",
            "Large UDP payloads",
            true,
            TestKind::IperfRun(IperfParams::udp(d, "1G").with_length("1470")),
        ),
        (
            "UDP Mixed (256/512/1470)",
            "Mixed UDP sizes",
            false,
            TestKind::Sequence(SequenceParams {
                legs: vec![
                    SequenceLeg::new("udp_256", IperfParams::udp(d, "200M").with_length("256")),
                    SequenceLeg::new("udp_512", IperfParams::udp(d, "200M").with_length("512")),
                    SequenceLeg::new("udp_1470", IperfParams::udp(d, "200M").with_length("1470")),
                ],
            }),
        ),
        (
            "UDP Reverse (END->UUT)",
            "UDP reverse direction",
            false,
            TestKind::IperfRun(IperfParams::udp(d, "100M").reversed()),
        ),
        (
            "Mixed TCP+UDP",
            "TCP + UDP sequential",
            false,
            TestKind::Sequence(SequenceParams {
                legs: vec![
                    SequenceLeg::new("tcp", IperfParams::tcp(d, 2)),
                    SequenceLeg::new("udp", IperfParams::udp(d, "100M")),
                ],
            }),
        ),
        (
            "Sensor Simulation",
            "Video UDP + telemetry TCP",
            false,
            TestKind::Sequence(SequenceParams {
                legs: vec![
                    SequenceLeg::new(
                        "video_udp",
                        IperfParams::udp(d, "500M").with_length("1470"),
                    ),
                    SequenceLeg::new("control_tcp", IperfParams::tcp(d, 1)),
                ],
            }),
        ),
        (
            "CPU Load + TCP",
            "stress-ng + TCP",
            false,
            TestKind::CpuLoaded(CpuLoadedParams {
                workers: 2,
                measurement: IperfParams::tcp(d, 1),
            }),
        ),
        (
            "CPU Load + UDP",
            "stress-ng + UDP",
            false,
            TestKind::CpuLoaded(CpuLoadedParams {
                workers: 2,
                measurement: IperfParams::udp(d, "500M"),
            }),
        ),
        (
            "Interval / Microburst",
            "Short-interval microburst",
            false,
            TestKind::IperfRun(IperfParams::tcp(20, 1).with_interval(0.5)),
        ),
        (
            "MTU Mismatch",
            "MTU mismatch behavior",
            false,
            TestKind::IperfRun(IperfParams::tcp(10, 1)),
        ),
        (
            "Fairness (2 sessions)",
            "Per-flow fairness",
            false,
            TestKind::Sequence(SequenceParams {
                legs: vec![
                    SequenceLeg::new("session_1", IperfParams::tcp(d, 1)),
                    SequenceLeg::new("session_2", IperfParams::tcp(d, 1)),
                ],
            }),
        ),
        (
            "Soak / Stability",
            "Long soak test",
            false,
            TestKind::IperfRun(IperfParams::tcp(15 * 60, 1)),
        ),
    ];

    defs.into_iter()
        .enumerate()
        .map(|(index, (name, description, concurrent_eligible, kind))| TestDefinition {
            id: index + 1,
            name,
            description,
            concurrent_eligible,
            kind,
        })
        .collect()
}

/// Look a test up by ordinal id or (case-insensitive) display name.
pub fn find<'a>(catalog: &'a [TestDefinition], selector: &str) -> Option<&'a TestDefinition> {
    if let Ok(id) = selector.trim().parse::<usize>() {
        return catalog.iter().find(|def| def.id == id);
    }
    catalog
        .iter()
        .find(|def| def.name.eq_ignore_ascii_case(selector.trim()))
}
