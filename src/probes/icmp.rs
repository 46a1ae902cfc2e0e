//! ICMP payload probe with the don't-fragment bit set -- the MTU validation
//! helper. Uses the system ping binary.

use crate::system::{self, Invocation};
use anyhow::Result;
use std::net::Ipv4Addr;
use tracing::debug;

/// Result of walking candidate payload sizes against a target.
#[derive(Debug)]
pub struct PayloadProbe {
    pub ok: bool,
    /// The size that passed, or the first candidate when none did.
    pub payload_bytes: u32,
    pub output: String,
}

/// Try each candidate payload size in order with DF set; the first size
/// whose probe succeeds wins.
pub async fn probe_payload_sizes(
    ping_program: &str,
    target: Ipv4Addr,
    sizes: &[u32],
) -> Result<PayloadProbe> {
    let mut last_output = String::new();
    for &size in sizes {
        let inv = Invocation::new(
            ping_program,
            vec![
                "-c".into(),
                "3".into(),
                "-M".into(),
                "do".into(),
                "-s".into(),
                size.to_string(),
                target.to_string(),
            ],
        );
        let out = system::run_capture(&inv).await?;
        let success = out.success();
        last_output = if out.stdout.is_empty() {
            out.stderr
        } else {
            out.stdout
        };
        if success {
            debug!(%target, payload = size, "payload probe passed");
            return Ok(PayloadProbe {
                ok: true,
                payload_bytes: size,
                output: last_output,
            });
        }
        debug!(%target, payload = size, "payload probe failed");
    }
    Ok(PayloadProbe {
        ok: false,
        payload_bytes: sizes.first().copied().unwrap_or(0),
        output: last_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Stand-in ping that accepts only payloads at or below 1472 bytes.
    /// The size is the sixth positional argument (-c 3 -M do -s N target).
    fn fake_ping(dir: &std::path::Path) -> String {
        let path = dir.join("fake-ping");
        std::fs::write(&path, "#!/bin/sh\nif [ \"$6\" -le 1472 ]; then echo ok; else echo toobig; exit 1; fi\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn first_passing_size_wins() {
        let dir = tempfile::tempdir().unwrap();
        let ping = fake_ping(dir.path());
        let probe = probe_payload_sizes(&ping, Ipv4Addr::LOCALHOST, &[8950, 8972, 1472])
            .await
            .unwrap();
        assert!(probe.ok);
        assert_eq!(probe.payload_bytes, 1472);
        assert!(probe.output.contains("ok"));
    }

    #[tokio::test]
    async fn all_failing_sizes_report_the_first_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let ping = fake_ping(dir.path());
        let probe = probe_payload_sizes(&ping, Ipv4Addr::LOCALHOST, &[8950, 8800])
            .await
            .unwrap();
        assert!(!probe.ok);
        assert_eq!(probe.payload_bytes, 8950);
    }

    #[tokio::test]
    async fn empty_candidate_list_fails_cleanly() {
        let probe = probe_payload_sizes("/bin/true", Ipv4Addr::LOCALHOST, &[])
            .await
            .unwrap();
        assert!(!probe.ok);
        assert_eq!(probe.payload_bytes, 0);
    }
}
