use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use blog_vpc_service::config::Settings;
use blog_vpc_service::database::{ConnectionDiagnostics, HeartbeatProbe};
use blog_vpc_service::server::{create_app, AppState};
use blog_vpc_service::tasks::HeartbeatTask;
use blog_vpc_service::telemetry::init_telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "blog-vpc-service",
    author,
    version,
    about = "Blog CRUD service backed by a VPC PostgreSQL database"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Ping the database once on a throwaway pool; exits non-zero on failure
    Heartbeat,
    /// Diagnose connectivity to the configured database and print the report
    Diagnose {
        /// Only resolve the host and probe the TCP port, skip the handshake
        #[arg(long)]
        network: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::new()?;
    let _telemetry = init_telemetry(&settings.telemetry, &settings.otel)?;
    tracing::info!("Configuration loaded");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(settings).await,
        Commands::Heartbeat => heartbeat(settings).await,
        Commands::Diagnose { network } => diagnose(settings, network).await,
    }
}

async fn serve(settings: Settings) -> Result<()> {
    // Create application state; the database pool is created on first use
    let state = AppState::new(settings.clone());
    let pool_manager = state.pool_manager.clone();
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start heartbeat task in background
    let heartbeat_handle = if settings.heartbeat.enabled {
        let heartbeat_task = HeartbeatTask::new(
            settings.heartbeat.clone(),
            state.heartbeat.clone(),
            shutdown_tx.subscribe(),
        );
        Some(tokio::spawn(async move {
            heartbeat_task.run().await;
        }))
    } else {
        None
    };

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for background tasks to finish
    if let Some(handle) = heartbeat_handle {
        tracing::info!("Waiting for background tasks to finish...");
        let _ = handle.await;
    }

    pool_manager.close().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn heartbeat(settings: Settings) -> Result<()> {
    let probe = HeartbeatProbe::new(settings.database.heartbeat_pool_config());
    let report = probe.ping().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        anyhow::bail!(
            "database heartbeat failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn diagnose(settings: Settings, network_only: bool) -> Result<()> {
    let config = settings.database.pool_config();
    let report = if network_only {
        ConnectionDiagnostics::network(&config).await
    } else {
        ConnectionDiagnostics::diagnose(&config).await
    };
    report.log();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop background tasks
    let _ = shutdown_tx.send(());
}
