//! Database error taxonomy.
//!
//! Every failure of the connection layer is classified into a closed set of
//! [`ErrorKind`] tags from the I/O error kind or the server SQLSTATE.

use std::io;
use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use super::probe::{classify_io, ProbeOutcome};

/// SQLSTATE `cannot_connect_now`, sent while the server is still starting up.
const SQLSTATE_CANNOT_CONNECT_NOW: &str = "57P03";

/// Closed classification of database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkTimeout,
    ConnectionRefused,
    HostUnreachable,
    ProtocolStartingUp,
    PoolExhausted,
    Query,
    GenericNetwork,
    Database,
    PoolClosed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkTimeout => "network_timeout",
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::HostUnreachable => "host_unreachable",
            ErrorKind::ProtocolStartingUp => "protocol_starting_up",
            ErrorKind::PoolExhausted => "pool_exhausted",
            ErrorKind::Query => "query",
            ErrorKind::GenericNetwork => "generic_network",
            ErrorKind::Database => "database",
            ErrorKind::PoolClosed => "pool_closed",
        }
    }
}

/// Errors raised by the connection layer.
///
/// Sources are reference counted so one failed pool creation can be handed
/// to every caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    #[error("connection to {addr} timed out")]
    NetworkTimeout { addr: String },

    #[error("connection to {addr} was refused")]
    ConnectionRefused { addr: String },

    #[error("host {addr} is unreachable")]
    HostUnreachable { addr: String },

    #[error("database is starting up: {0}")]
    ProtocolStartingUp(#[source] Arc<sqlx::Error>),

    #[error("no pooled connection became available in time")]
    PoolExhausted,

    #[error("query failed: {0}")]
    Query(#[source] Arc<sqlx::Error>),

    #[error("network error talking to {addr}: {source}")]
    GenericNetwork {
        addr: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("database error: {0}")]
    Database(#[source] Arc<sqlx::Error>),

    #[error("connection pool is closed")]
    PoolClosed,
}

impl DatabaseError {
    /// The classification tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::NetworkTimeout { .. } => ErrorKind::NetworkTimeout,
            DatabaseError::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            DatabaseError::HostUnreachable { .. } => ErrorKind::HostUnreachable,
            DatabaseError::ProtocolStartingUp(_) => ErrorKind::ProtocolStartingUp,
            DatabaseError::PoolExhausted => ErrorKind::PoolExhausted,
            DatabaseError::Query(_) => ErrorKind::Query,
            DatabaseError::GenericNetwork { .. } => ErrorKind::GenericNetwork,
            DatabaseError::Database(_) => ErrorKind::Database,
            DatabaseError::PoolClosed => ErrorKind::PoolClosed,
        }
    }

    /// Classify a socket error raised while talking to `addr`.
    pub fn from_io(err: io::Error, addr: &str) -> Self {
        let addr = addr.to_string();
        match classify_io(&err) {
            ProbeOutcome::Timeout => DatabaseError::NetworkTimeout { addr },
            ProbeOutcome::Refused => DatabaseError::ConnectionRefused { addr },
            ProbeOutcome::Unreachable => DatabaseError::HostUnreachable { addr },
            ProbeOutcome::Connected | ProbeOutcome::Other => DatabaseError::GenericNetwork {
                addr,
                source: Arc::new(err),
            },
        }
    }

    /// Classify a driver error raised while connecting to `addr`.
    pub fn from_sqlx(err: sqlx::Error, addr: &str) -> Self {
        if is_starting_up(&err) {
            return DatabaseError::ProtocolStartingUp(Arc::new(err));
        }

        match err {
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed => DatabaseError::PoolClosed,
            sqlx::Error::Io(io_err) => Self::from_io(io_err, addr),
            other => DatabaseError::Database(Arc::new(other)),
        }
    }

    /// Classify a failed `acquire` on `pool`.
    ///
    /// sqlx retries refused connects until the acquire deadline and then
    /// reports a pool timeout. When the pool still had room the deadline was
    /// spent connecting, so that is a network timeout rather than exhaustion.
    pub fn from_acquire(err: sqlx::Error, pool: &PgPool, addr: &str) -> Self {
        if matches!(err, sqlx::Error::PoolTimedOut)
            && pool.size() < pool.options().get_max_connections()
        {
            return DatabaseError::NetworkTimeout {
                addr: addr.to_string(),
            };
        }
        Self::from_sqlx(err, addr)
    }

    /// Wrap a statement-level failure.
    pub fn query(err: sqlx::Error) -> Self {
        DatabaseError::Query(Arc::new(err))
    }

    /// SQLSTATE reported by the server, if any.
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            DatabaseError::ProtocolStartingUp(e)
            | DatabaseError::Query(e)
            | DatabaseError::Database(e) => e
                .as_database_error()
                .and_then(|db| db.code())
                .map(|code| code.into_owned()),
            _ => None,
        }
    }
}

fn is_starting_up(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == SQLSTATE_CANNOT_CONNECT_NOW)
}
