//! TCP connection probe -- reachability precheck for the measurement
//! listener on END.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Attempt a bounded-duration TCP connection to `ip:port`.
pub async fn check_reachable(ip: Ipv4Addr, port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(%ip, %port, "connect failed: {e}");
            false
        }
        Err(_) => {
            debug!(%ip, %port, "connect timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[tokio::test]
    async fn listener_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(
            check_reachable(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).await
        );
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        // Bind then drop to find a port that is very likely closed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(
            !check_reachable(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).await
        );
    }
}
