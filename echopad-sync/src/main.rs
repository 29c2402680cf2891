//! Echopad Sync Core server entrypoint.
//!
//! Same shape as the teacher's `distributed_main.rs`: a `clap` `Cli`/
//! `Commands`, environment-sourced `Config`, `tracing_subscriber` init in
//! `main`, then a composition root that builds every core service once
//! and hands them to the axum router via `AppState`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use echopad_sync::api::{self, AppState};
use echopad_sync::config::Config;
use echopad_sync_core::audit::AuditLog;
use echopad_sync_core::auth::AuthService;
use echopad_sync_core::blob::{BlobStore, S3BlobStore};
use echopad_sync_core::db;
use echopad_sync_core::file_transfer::FileTransferService;
use echopad_sync_core::rate_limit::RateLimiter;
use echopad_sync_core::sync::SyncEngine;
use echopad_sync_core::token::TokenService;
use echopad_sync_core::vault::VaultService;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "echopad-sync")]
#[command(about = "End-to-end encrypted multi-device vault sync server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations and exit.
    Migrate,
    /// Start the sync server.
    Serve {
        #[arg(short, long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Migrate => {
            info!("running migrations");
            db::connect(&config.database_url).await?;
            info!("migrations complete");
        }
        Commands::Serve { addr } => {
            let bind_addr = addr.unwrap_or(config.bind_addr.clone());
            run_server(&bind_addr, config).await?;
        }
    }

    Ok(())
}

async fn run_server(addr: &str, config: Config) -> Result<()> {
    let pool = db::connect(&config.database_url).await?;

    let blobs: Arc<dyn BlobStore> = Arc::new(S3BlobStore::from_env(config.s3_bucket.clone(), config.s3_endpoint.as_deref()).await);
    let tokens = Arc::new(TokenService::new(config.jwt_secret.clone()));
    let audit = Arc::new(AuditLog::new(pool.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(pool.clone()));

    let vaults = Arc::new(VaultService::new(pool.clone(), blobs.clone()));
    let auth = Arc::new(AuthService::new(pool.clone(), tokens.clone(), audit.clone(), blobs.clone()));
    let sync = Arc::new(SyncEngine::new(
        pool.clone(),
        blobs.clone(),
        vaults.clone(),
        rate_limiter.clone(),
        audit.clone(),
    ));
    let files = Arc::new(FileTransferService::new(pool.clone(), blobs.clone(), vaults.clone(), rate_limiter.clone()));

    spawn_rate_bucket_sweep(rate_limiter.clone());

    let state = AppState { auth, vaults, sync, files, tokens, rate_limiter, audit };
    let app = api::router(state);

    info!(%addr, "starting echopad-sync server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Spec §4.3: "a periodic sweep removes expired buckets."
fn spawn_rate_bucket_sweep(rate_limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            match rate_limiter.sweep_expired().await {
                Ok(removed) if removed > 0 => info!(removed, "swept expired rate buckets"),
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "rate bucket sweep failed"),
            }
        }
    });
}
