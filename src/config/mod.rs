mod settings;

pub use settings::{
    DatabaseConfig, HeartbeatConfig, OtelConfig, ServerConfig, Settings, TelemetryConfig,
};
