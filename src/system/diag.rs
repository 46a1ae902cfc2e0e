//! Link-layer diagnostics shelled out to `ip` and `ethtool`, plus the sysfs
//! interface scan used for port auto-detection and config validation.

use crate::system::{self, CommandOutput, Invocation};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::warn;

/// Error counters compared before/after a traffic burst.
pub const ERROR_COUNTER_KEYS: [&str; 5] = [
    "rx_errors",
    "rx_crc_errors",
    "rx_dropped",
    "tx_errors",
    "tx_dropped",
];

/// `ip link show <iface>`.
pub async fn link_show(ip_program: &str, iface: &str) -> Result<CommandOutput> {
    let inv = Invocation::new(
        ip_program,
        vec!["link".into(), "show".into(), iface.into()],
    );
    system::run_capture(&inv).await
}

/// `ethtool <iface>` -- speed, duplex, link detection.
pub async fn link_settings(ethtool_program: &str, iface: &str) -> Result<CommandOutput> {
    let inv = Invocation::new(ethtool_program, vec![iface.into()]);
    system::run_capture(&inv).await
}

/// `ethtool -S <iface>` -- driver statistics counters.
pub async fn link_stats(ethtool_program: &str, iface: &str) -> Result<CommandOutput> {
    let inv = Invocation::new(ethtool_program, vec!["-S".into(), iface.into()]);
    system::run_capture(&inv).await
}

/// `ip link set dev <iface> mtu <mtu>`; returns the exit code.
pub async fn set_mtu(ip_program: &str, iface: &str, mtu: u32) -> Result<i32> {
    let inv = Invocation::new(
        ip_program,
        vec![
            "link".into(),
            "set".into(),
            "dev".into(),
            iface.into(),
            "mtu".into(),
            mtu.to_string(),
        ],
    );
    Ok(system::run_capture(&inv).await?.exit_code)
}

/// Current MTU of an interface, parsed from `ip link show`.
pub async fn interface_mtu(ip_program: &str, iface: &str) -> Result<Option<u32>> {
    let out = link_show(ip_program, iface).await?;
    Ok(parse_mtu(&out.stdout))
}

pub(crate) fn parse_mtu(text: &str) -> Option<u32> {
    let pos = text.find("mtu ")?;
    text[pos + 4..]
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
}

/// Whether an interface name exists on this host.
pub fn interface_exists(iface: &str) -> bool {
    !iface.is_empty()
        && !iface.contains('/')
        && std::path::Path::new("/sys/class/net").join(iface).exists()
}

/// Parse `ethtool -S` output into named integer counters.
/// Lines that do not look like `name: value` are skipped.
pub fn parse_counters(text: &str) -> BTreeMap<String, i64> {
    let mut counters = BTreeMap::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if let Ok(value) = value.trim().parse::<i64>() {
                counters.insert(key.trim().to_string(), value);
            }
        }
    }
    counters
}

/// Counters among `keys` that increased between the two snapshots.
pub fn counter_increases(
    before: &BTreeMap<String, i64>,
    after: &BTreeMap<String, i64>,
    keys: &[&str],
) -> Vec<(String, i64)> {
    let mut increases = Vec::new();
    for &key in keys {
        if let (Some(b), Some(a)) = (before.get(key), after.get(key)) {
            let delta = a - b;
            if delta > 0 {
                increases.push((key.to_string(), delta));
            }
        }
    }
    increases
}

/// A connected wired port found during auto-detection.
#[derive(Debug, serde::Serialize)]
pub struct DetectedPort {
    pub name: String,
    pub ip: Option<Ipv4Addr>,
    pub speed_mbps: Option<i64>,
    pub state: String,
}

/// Scan /sys/class/net for wired-looking interfaces that are up, with link
/// speed from sysfs and a best-effort local IPv4 from `ip addr show`.
pub async fn detect_ethernet_ports(ip_program: &str) -> Result<Vec<DetectedPort>> {
    let mut ports = Vec::new();
    let entries =
        std::fs::read_dir("/sys/class/net").context("failed to read network interfaces")?;

    for entry in entries {
        let entry = entry?;
        let iface = entry.file_name().to_string_lossy().into_owned();
        if !looks_wired(&iface) {
            continue;
        }

        let operstate = std::fs::read_to_string(entry.path().join("operstate"))
            .unwrap_or_default()
            .trim()
            .to_string();
        if operstate != "up" {
            continue;
        }

        let speed_mbps = std::fs::read_to_string(entry.path().join("speed"))
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|&speed| speed > 0);

        let ip = match system::run_capture(&Invocation::new(
            ip_program,
            vec!["addr".into(), "show".into(), iface.clone()],
        ))
        .await
        {
            Ok(out) if out.success() => parse_inet_addr(&out.stdout),
            Ok(_) => None,
            Err(e) => {
                warn!(iface = %iface, "address lookup failed: {e:#}");
                None
            }
        };

        ports.push(DetectedPort {
            name: iface,
            ip,
            speed_mbps,
            state: operstate,
        });
    }

    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}

fn looks_wired(iface: &str) -> bool {
    iface.starts_with("eth") || iface.starts_with("enp") || iface.starts_with("ens")
}

/// First `inet a.b.c.d/...` address in `ip addr show` output.
pub(crate) fn parse_inet_addr(text: &str) -> Option<Ipv4Addr> {
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("inet ") {
            let addr = rest.split(|c| c == '/' || c == ' ').next()?;
            if let Ok(ip) = addr.parse() {
                return Some(ip);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS: &str = "NIC statistics:\n     rx_packets: 1000\n     rx_errors: 2\n     rx_crc_errors: 0\n     tx_errors: 1\n     not_a_counter: abc\n";

    #[test]
    fn parses_counters_and_skips_junk() {
        let counters = parse_counters(STATS);
        assert_eq!(counters.get("rx_packets"), Some(&1000));
        assert_eq!(counters.get("rx_errors"), Some(&2));
        assert!(!counters.contains_key("not_a_counter"));
        assert!(!counters.contains_key("NIC statistics"));
    }

    #[test]
    fn reports_only_increases_in_watched_keys() {
        let before = parse_counters("rx_errors: 2\ntx_errors: 5\nrx_dropped: 7\n");
        let after = parse_counters("rx_errors: 4\ntx_errors: 5\nrx_dropped: 6\n");
        let increases = counter_increases(&before, &after, &ERROR_COUNTER_KEYS);
        assert_eq!(increases, vec![("rx_errors".to_string(), 2)]);
    }

    #[test]
    fn mtu_parses_from_link_show_output() {
        let out = "2: enp1s0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 9000 qdisc mq state UP";
        assert_eq!(parse_mtu(out), Some(9000));
        assert_eq!(parse_mtu("no mtu here"), None);
    }

    #[test]
    fn inet_addr_parses_first_ipv4() {
        let out = "2: enp1s0: <BROADCAST>\n    inet 192.168.1.10/24 brd 192.168.1.255 scope global enp1s0\n    inet6 fe80::1/64 scope link\n";
        assert_eq!(parse_inet_addr(out), Some("192.168.1.10".parse().unwrap()));
        assert_eq!(parse_inet_addr("nothing"), None);
    }

    #[test]
    fn loopback_is_not_wired() {
        assert!(!looks_wired("lo"));
        assert!(!looks_wired("wlan0"));
        assert!(looks_wired("enp1s0"));
        assert!(looks_wired("eth0"));
        assert!(looks_wired("ens18"));
    }

    #[test]
    fn interface_exists_rejects_path_tricks() {
        assert!(!interface_exists(""));
        assert!(!interface_exists("../etc"));
    }
}
