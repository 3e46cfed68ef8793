//! udulib-api - University document library service
//!
//! Serves the REST API under `/api/v1`: accounts and authentication, the
//! academic taxonomy, document upload/download/preview, community features
//! (comments, ratings, forums), notifications, shared links and statistics.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use udulib_common::config::{CliOverrides, Settings};
use udulib_common::db::{ensure_admin_user, init_database};

use udulib_api::storage::Storage;
use udulib_api::{build_router, mail, AppState};

/// Command-line arguments for udulib-api
#[derive(Parser, Debug)]
#[command(name = "udulib-api")]
#[command(about = "University document library API server")]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "UDULIB_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
        }
    }
}

/// Settings are loaded under a temporary stderr subscriber so their
/// warnings are visible before the configured one is installed.
fn load_settings(args: &Args) -> Result<Settings> {
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(bootstrap, || {
        Settings::load(args.config.as_deref(), &args.overrides())
    })
    .context("Failed to load configuration")
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "udulib_api={level},udulib_common={level},tower_http={level}",
            level = settings.logging.level
        ))
    });

    if settings.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(&args)?;
    init_tracing(&settings);

    info!("Starting {} v{}", settings.server.project_name, env!("CARGO_PKG_VERSION"));
    info!(
        "Build: {} ({}, {})",
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let db = init_database(&settings.database)
        .await
        .context("Failed to initialize database")?;
    info!("Database: {}", settings.database.path.display());

    if let Some(admin_id) = ensure_admin_user(&db, &settings.admin, settings.security.bcrypt_cost).await? {
        info!("Bootstrap administrator created (user_id={})", admin_id);
    }

    let storage = Storage::from_config(
        &settings.storage,
        &settings.security.jwt_secret,
        &settings.server.public_url,
    )
    .context("Failed to configure object storage")?;
    storage.ensure_buckets().await;

    let mailer = mail::from_config(&settings.email).context("Failed to configure email")?;
    if settings.email.smtp_host.is_none() {
        warn!("SMTP not configured; outgoing mail will be logged");
    }

    let bind_address = settings.bind_address();
    let state = AppState::new(db, settings, storage, Arc::clone(&mailer))?;
    if state.google.is_none() {
        info!("Google login disabled (oauth.google not configured)");
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
