//! Staged connection diagnostics.
//!
//! A diagnosis runs a TCP probe and then a throwaway protocol handshake
//! against the configured database. It never fails: every outcome is
//! captured in a [`DiagnosticReport`] that callers log and discard.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::{Connection, PgConnection};

use super::error::{DatabaseError, ErrorKind};
use super::pool::PoolConfig;
use super::probe::{self, ProbeOutcome, ProbeResult};
use crate::metrics::DiagnosticMetrics;

/// Outcome of the throwaway protocol handshake.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandshakeOutcome {
    /// Connected and answered a liveness query
    Ready { elapsed_ms: u64 },
    /// The server answered but is still starting up
    StartingUp { message: String },
    Failed {
        error_kind: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl HandshakeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeOutcome::Ready { .. } => "ready",
            HandshakeOutcome::StartingUp { .. } => "starting_up",
            HandshakeOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, HandshakeOutcome::Ready { .. })
    }

    fn from_error(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ProtocolStartingUp(ref e) => HandshakeOutcome::StartingUp {
                message: e.to_string(),
            },
            other => HandshakeOutcome::Failed {
                error_kind: other.kind(),
                code: other.sqlstate(),
                message: other.to_string(),
            },
        }
    }
}

/// Name resolution result for the target host.
#[derive(Debug, Clone, Serialize)]
pub struct DnsResolution {
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything one diagnosis found out. Write-once, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsResolution>,
    pub probe: ProbeResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake: Option<HandshakeOutcome>,
    pub elapsed_ms: u64,
}

impl DiagnosticReport {
    /// True when every stage that ran succeeded.
    pub fn is_healthy(&self) -> bool {
        let dns_ok = self.dns.as_ref().is_none_or(|dns| dns.error.is_none());
        let handshake_ok = self.handshake.as_ref().is_none_or(|h| h.is_ready());
        dns_ok && self.probe.is_connected() && handshake_ok
    }

    /// Narrow a bare connect timeout down to the cause this report found.
    ///
    /// The driver keeps retrying refused or rejected connects until its
    /// acquire deadline, so the pool only ever sees a timeout. Any other
    /// error is returned unchanged.
    pub fn refine(&self, err: DatabaseError) -> DatabaseError {
        if err.kind() != ErrorKind::NetworkTimeout {
            return err;
        }
        let addr = self.target.clone();

        match &self.handshake {
            Some(HandshakeOutcome::StartingUp { message }) => {
                return DatabaseError::ProtocolStartingUp(Arc::new(sqlx::Error::Protocol(
                    message.clone(),
                )));
            }
            Some(HandshakeOutcome::Failed { error_kind, .. }) => match error_kind {
                ErrorKind::ConnectionRefused => return DatabaseError::ConnectionRefused { addr },
                ErrorKind::HostUnreachable => return DatabaseError::HostUnreachable { addr },
                _ => {}
            },
            _ => {}
        }

        match self.probe.outcome {
            ProbeOutcome::Refused => DatabaseError::ConnectionRefused { addr },
            ProbeOutcome::Unreachable => DatabaseError::HostUnreachable { addr },
            _ => err,
        }
    }

    /// Emit one event per stage with its classification.
    pub fn log(&self) {
        if let Some(dns) = &self.dns {
            match &dns.error {
                None => tracing::info!(
                    target_addr = %self.target,
                    addresses = ?dns.addresses,
                    "Diagnostics: DNS resolution succeeded"
                ),
                Some(error) => tracing::warn!(
                    target_addr = %self.target,
                    error = %error,
                    "Diagnostics: DNS resolution failed"
                ),
            }
        }

        if self.probe.is_connected() {
            tracing::info!(
                target_addr = %self.target,
                elapsed_ms = self.probe.elapsed_ms,
                "Diagnostics: TCP connection succeeded, network path is open"
            );
        } else {
            tracing::warn!(
                target_addr = %self.target,
                outcome = self.probe.outcome.as_str(),
                hint = self.probe.outcome.hint(),
                cause = self.probe.cause.as_deref().unwrap_or(""),
                elapsed_ms = self.probe.elapsed_ms,
                "Diagnostics: TCP connection failed"
            );
        }

        match &self.handshake {
            None => {}
            Some(HandshakeOutcome::Ready { elapsed_ms }) => tracing::info!(
                target_addr = %self.target,
                elapsed_ms,
                "Diagnostics: PostgreSQL handshake succeeded, database is running"
            ),
            Some(HandshakeOutcome::StartingUp { message }) => tracing::warn!(
                target_addr = %self.target,
                message = %message,
                "Diagnostics: database is starting up"
            ),
            Some(HandshakeOutcome::Failed {
                error_kind,
                message,
                code,
            }) => tracing::warn!(
                target_addr = %self.target,
                error_kind = error_kind.as_str(),
                code = code.as_deref().unwrap_or(""),
                message = %message,
                "Diagnostics: PostgreSQL handshake failed"
            ),
        }
    }
}

/// Runs the diagnostic stages against a pool configuration.
pub struct ConnectionDiagnostics;

impl ConnectionDiagnostics {
    /// TCP probe followed by a protocol handshake, strictly in that order.
    /// The handshake runs whatever the probe found.
    pub async fn diagnose(config: &PoolConfig) -> DiagnosticReport {
        let start = Instant::now();
        tracing::info!(target_addr = %config.addr(), "Starting database connection diagnostics");

        let probe = probe::probe(&config.host, config.port, config.diagnostic_timeout).await;
        DiagnosticMetrics::record_probe(probe.outcome.as_str());

        let handshake = Self::handshake(config).await;
        DiagnosticMetrics::record_handshake(handshake.as_str());

        DiagnosticReport {
            target: config.addr(),
            dns: None,
            probe,
            handshake: Some(handshake),
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Network-level checks only: name resolution and a TCP probe.
    pub async fn network(config: &PoolConfig) -> DiagnosticReport {
        let start = Instant::now();

        let dns = Self::resolve(config).await;
        let probe = probe::probe(&config.host, config.port, config.diagnostic_timeout).await;
        DiagnosticMetrics::record_probe(probe.outcome.as_str());

        DiagnosticReport {
            target: config.addr(),
            dns: Some(dns),
            probe,
            handshake: None,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn resolve(config: &PoolConfig) -> DnsResolution {
        let lookup = tokio::net::lookup_host((config.host.as_str(), config.port));
        match tokio::time::timeout(config.diagnostic_timeout, lookup).await {
            Ok(Ok(addrs)) => DnsResolution {
                addresses: addrs.map(|addr| addr.ip().to_string()).collect(),
                error: None,
            },
            Ok(Err(e)) => DnsResolution {
                addresses: Vec::new(),
                error: Some(e.to_string()),
            },
            Err(_) => DnsResolution {
                addresses: Vec::new(),
                error: Some(format!(
                    "lookup timed out after {} ms",
                    config.diagnostic_timeout.as_millis()
                )),
            },
        }
    }

    /// Open one connection, run `SELECT 1`, close it.
    async fn handshake(config: &PoolConfig) -> HandshakeOutcome {
        let options = config.connect_options();
        let start = Instant::now();

        let attempt = async {
            let mut conn = PgConnection::connect_with(&options).await?;
            let result = sqlx::query("SELECT 1").execute(&mut conn).await;
            let _ = conn.close().await;
            result.map(|_| ())
        };

        match tokio::time::timeout(config.diagnostic_timeout, attempt).await {
            Ok(Ok(())) => HandshakeOutcome::Ready {
                elapsed_ms: start.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) => HandshakeOutcome::from_error(DatabaseError::from_sqlx(e, &config.addr())),
            Err(_) => HandshakeOutcome::Failed {
                error_kind: ErrorKind::NetworkTimeout,
                message: format!(
                    "no handshake within {} ms",
                    config.diagnostic_timeout.as_millis()
                ),
                code: None,
            },
        }
    }
}
