//! Throughput measurement engine: iperf3 invocation building, report
//! summarization, and the retransmit-threshold decision.

pub mod concurrent;
pub mod decision;
pub mod iperf;

use crate::system::Invocation;
use serde::Serialize;
use std::net::Ipv4Addr;

pub const DEFAULT_DURATION_SECS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transport {
    Tcp,
    Udp,
}

/// One fully-specified measurement run against a remote endpoint.
/// Constructed from a channel plus test parameters; never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub target: Ipv4Addr,
    pub duration_secs: u32,
    pub streams: u32,
    pub transport: Transport,
    pub bind: Option<Ipv4Addr>,
    pub port: Option<u16>,
    pub bandwidth: Option<String>,
    pub length: Option<String>,
    pub reverse: bool,
    pub bidir: bool,
    pub window: Option<String>,
    /// Reporting interval in seconds (microburst runs).
    pub interval: Option<f64>,
}

impl RunRequest {
    pub fn new(target: Ipv4Addr, duration_secs: u32, streams: u32) -> Self {
        Self {
            target,
            duration_secs,
            streams,
            transport: Transport::Tcp,
            bind: None,
            port: None,
            bandwidth: None,
            length: None,
            reverse: false,
            bidir: false,
            window: None,
            interval: None,
        }
    }

    /// iperf3 client argv for this request, always with a JSON report.
    pub fn to_invocation(&self, iperf_program: &str) -> Invocation {
        let mut args: Vec<String> = Vec::new();
        if self.transport == Transport::Udp {
            args.push("-u".into());
        }
        if let Some(bind) = self.bind {
            args.push("-B".into());
            args.push(bind.to_string());
        }
        args.push("-c".into());
        args.push(self.target.to_string());
        if let Some(port) = self.port {
            args.push("-p".into());
            args.push(port.to_string());
        }
        args.push("-t".into());
        args.push(self.duration_secs.to_string());
        args.push("-P".into());
        args.push(self.streams.to_string());
        if self.reverse {
            args.push("-R".into());
        }
        if self.bidir {
            args.push("--bidir".into());
        }
        if let Some(window) = &self.window {
            args.push("-w".into());
            args.push(window.clone());
        }
        if let Some(bandwidth) = &self.bandwidth {
            args.push("-b".into());
            args.push(bandwidth.clone());
        }
        if let Some(length) = &self.length {
            args.push("-l".into());
            args.push(length.clone());
        }
        if let Some(interval) = self.interval {
            args.push("-i".into());
            args.push(interval.to_string());
        }
        args.push("-J".into());
        Invocation::new(iperf_program, args)
    }
}
