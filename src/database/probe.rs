//! Bounded-time TCP reachability probe.

use std::io;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Outcome of a single TCP probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The handshake completed
    Connected,
    /// The deadline expired first
    Timeout,
    /// The remote host actively refused the connection
    Refused,
    /// No route to the host or network
    Unreachable,
    /// Any other socket error
    Other,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Connected => "connected",
            ProbeOutcome::Timeout => "timeout",
            ProbeOutcome::Refused => "refused",
            ProbeOutcome::Unreachable => "unreachable",
            ProbeOutcome::Other => "other",
        }
    }

    /// Likely cause, for operators reading the logs.
    pub fn hint(&self) -> &'static str {
        match self {
            ProbeOutcome::Connected => "network path and security groups are fine",
            ProbeOutcome::Timeout => "cold start or proxy warm-up",
            ProbeOutcome::Refused => "database not running or auto-paused",
            ProbeOutcome::Unreachable => "VPC routing or subnet configuration",
            ProbeOutcome::Other => "unexpected socket error",
        }
    }
}

/// Result of a TCP probe against one address.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub addr: String,
    pub outcome: ProbeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub elapsed_ms: u64,
}

impl ProbeResult {
    pub fn is_connected(&self) -> bool {
        self.outcome == ProbeOutcome::Connected
    }
}

/// Map a socket error onto a probe outcome.
pub fn classify_io(err: &io::Error) -> ProbeOutcome {
    match err.kind() {
        io::ErrorKind::TimedOut => ProbeOutcome::Timeout,
        io::ErrorKind::ConnectionRefused => ProbeOutcome::Refused,
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            ProbeOutcome::Unreachable
        }
        _ => ProbeOutcome::Other,
    }
}

/// Attempt one TCP handshake with `host:port`, giving up after `timeout`.
///
/// A successful connection is shut down immediately. Name resolution counts
/// against the same deadline. No retries.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    let addr = format!("{}:{}", host, port);
    let start = Instant::now();

    let (outcome, cause) =
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(mut stream)) => {
                let _ = stream.shutdown().await;
                (ProbeOutcome::Connected, None)
            }
            Ok(Err(e)) => (classify_io(&e), Some(e.to_string())),
            Err(_) => (ProbeOutcome::Timeout, None),
        };

    let elapsed_ms = start.elapsed().as_millis() as u64;

    tracing::debug!(
        addr = %addr,
        outcome = outcome.as_str(),
        elapsed_ms,
        "TCP probe finished"
    );

    ProbeResult {
        addr,
        outcome,
        cause,
        elapsed_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_probe_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = probe("127.0.0.1", port, Duration::from_secs(2)).await;
        assert_eq!(result.outcome, ProbeOutcome::Connected);
        assert!(result.is_connected());
        assert!(result.cause.is_none());
        assert_eq!(result.addr, format!("127.0.0.1:{}", port));
    }

    #[tokio::test]
    async fn test_probe_refused_within_timeout() {
        let port = closed_port().await;
        let timeout = Duration::from_secs(2);

        let start = Instant::now();
        let result = probe("127.0.0.1", port, timeout).await;

        assert_eq!(result.outcome, ProbeOutcome::Refused);
        assert!(result.cause.is_some());
        assert!(start.elapsed() < timeout + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_probe_unroutable_never_connects() {
        // TEST-NET-1, reserved for documentation
        let timeout = Duration::from_millis(300);

        let start = Instant::now();
        let result = probe("192.0.2.1", 5432, timeout).await;

        assert_ne!(result.outcome, ProbeOutcome::Connected);
        assert!(start.elapsed() < timeout + Duration::from_millis(500));
    }

    #[test]
    fn test_classify_io() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_io(&refused), ProbeOutcome::Refused);

        let unreachable = io::Error::from(io::ErrorKind::NetworkUnreachable);
        assert_eq!(classify_io(&unreachable), ProbeOutcome::Unreachable);

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(classify_io(&reset), ProbeOutcome::Other);
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_string(&ProbeOutcome::Unreachable).unwrap(),
            "\"unreachable\""
        );
        assert_eq!(ProbeOutcome::Timeout.as_str(), "timeout");
    }
}
