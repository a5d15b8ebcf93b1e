use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::database::{PoolConfig, TlsMode};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database connection settings, read from the `DB_*` environment variables.
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Direct database host
    #[serde(default = "default_db_host")]
    pub host: String,
    /// Proxy endpoint; takes precedence over `host` for the main pool
    #[serde(default)]
    pub proxy_endpoint: Option<String>,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Connect timeout used by diagnostics and the heartbeat pool
    #[serde(default = "default_diagnostic_timeout_ms")]
    pub diagnostic_timeout_ms: u64,
    /// `verify`, `skip-verify` (encrypted, certificate not checked) or `disable`
    #[serde(default)]
    pub tls_mode: TlsMode,
    #[serde(default = "default_true")]
    pub diagnostics_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Run the periodic in-process heartbeat (an external scheduler can call
    /// `GET /heartbeat` or the `heartbeat` subcommand instead)
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "postgres".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_diagnostic_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval() -> u64 {
    300 // 5 minutes
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "blog-vpc-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut settings: Settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, HEARTBEAT__ENABLED, OTEL__ENDPOINT, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.database = DatabaseConfig::from_env()?;
        Ok(settings)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl DatabaseConfig {
    /// Load from `DB_HOST`, `DB_PROXY_ENDPOINT`, `DB_PORT`, `DB_NAME`, `DB_USER`,
    /// `DB_PASSWORD`, `DB_MAX_CONNECTIONS`, `DB_IDLE_TIMEOUT_MS`, ...
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(Environment::with_prefix("DB").prefix_separator("_"))
    }

    fn from_source(source: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/database").required(false))
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    /// Host the main pool connects to.
    pub fn effective_host(&self) -> &str {
        match self.proxy_endpoint.as_deref() {
            Some(endpoint) if !endpoint.trim().is_empty() => endpoint,
            _ => &self.host,
        }
    }

    /// Configuration of the long-lived main pool.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            host: self.effective_host().to_string(),
            port: self.port,
            database: self.name.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            max_connections: self.max_connections,
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            diagnostic_timeout: Duration::from_millis(self.diagnostic_timeout_ms),
            tls: self.tls_mode,
        }
    }

    /// Configuration of the throwaway heartbeat pool. Always targets the
    /// database host directly so that the ping reaches the instance itself.
    pub fn heartbeat_pool_config(&self) -> PoolConfig {
        let diagnostic_timeout = Duration::from_millis(self.diagnostic_timeout_ms);
        PoolConfig {
            host: self.host.clone(),
            port: self.port,
            database: self.name.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            max_connections: 1,
            idle_timeout: diagnostic_timeout,
            connect_timeout: diagnostic_timeout,
            diagnostic_timeout,
            tls: self.tls_mode,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("proxy_endpoint", &self.proxy_endpoint)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("max_connections", &self.max_connections)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("diagnostic_timeout_ms", &self.diagnostic_timeout_ms)
            .field("tls_mode", &self.tls_mode)
            .field("diagnostics_enabled", &self.diagnostics_enabled)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            proxy_endpoint: None,
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            max_connections: default_max_connections(),
            idle_timeout_ms: default_idle_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            diagnostic_timeout_ms: default_diagnostic_timeout_ms(),
            tls_mode: TlsMode::default(),
            diagnostics_enabled: true,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: default_heartbeat_interval(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> DatabaseConfig {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DatabaseConfig::from_source(
            Environment::with_prefix("DB")
                .prefix_separator("_")
                .source(Some(source)),
        )
        .unwrap()
    }

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 3000);

        let db = DatabaseConfig::default();
        assert_eq!(db.port, 5432);
        assert_eq!(db.max_connections, 10);
        assert_eq!(db.idle_timeout_ms, 30_000);
        assert_eq!(db.connect_timeout_ms, 10_000);
        assert_eq!(db.diagnostic_timeout_ms, 5_000);
        assert_eq!(db.tls_mode, TlsMode::SkipVerify);
        assert!(db.diagnostics_enabled);
    }

    #[test]
    fn test_db_env_variables() {
        let db = from_vars(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_NAME", "blog"),
            ("DB_USER", "writer"),
            ("DB_PASSWORD", "s3cret"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("DB_TLS_MODE", "verify"),
        ]);

        assert_eq!(db.host, "db.internal");
        assert_eq!(db.port, 6543);
        assert_eq!(db.name, "blog");
        assert_eq!(db.user, "writer");
        assert_eq!(db.password, "s3cret");
        assert_eq!(db.max_connections, 4);
        assert_eq!(db.tls_mode, TlsMode::Verify);
        assert_eq!(db.idle_timeout_ms, 30_000);
    }

    #[test]
    fn test_proxy_endpoint_overrides_host() {
        let db = from_vars(&[
            ("DB_HOST", "db.internal"),
            ("DB_PROXY_ENDPOINT", "proxy.internal"),
        ]);

        assert_eq!(db.pool_config().host, "proxy.internal");
        // heartbeat goes straight to the instance
        assert_eq!(db.heartbeat_pool_config().host, "db.internal");
    }

    #[test]
    fn test_blank_proxy_endpoint_is_ignored() {
        let db = DatabaseConfig {
            proxy_endpoint: Some("  ".to_string()),
            ..DatabaseConfig::default()
        };
        assert_eq!(db.effective_host(), "localhost");
    }

    #[test]
    fn test_heartbeat_pool_config_is_minimal() {
        let db = DatabaseConfig::default();
        let config = db.heartbeat_pool_config();
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.connect_timeout, Duration::from_millis(5_000));
        assert_eq!(config.tls, TlsMode::SkipVerify);
    }

    #[test]
    fn test_debug_masks_password() {
        let db = DatabaseConfig {
            password: "hunter2".to_string(),
            ..DatabaseConfig::default()
        };
        let debug = format!("{:?}", db);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }
}
