// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # nostr-auth Server
//!
//! Entry point for the `nostr-auth-server` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the database, and serves the HTTP
//! API next to a Prometheus endpoint.
//!
//! Subcommands:
//!
//! - `run`           : start the service
//! - `keygen`        : print a fresh key pair
//! - `sign-challenge`: sign a challenge response, for poking at the API by hand
//! - `version`       : print build version information

mod api;
mod cli;
mod dev;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use nostr_auth::config::{unix_now, AuthConfig, CHALLENGE_SWEEP_INTERVAL};
use nostr_auth::db::AuthDb;
use nostr_auth::event::{EventBuilder, Keys};

use cli::{Commands, NostrAuthCli};
use metrics::AuthMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NostrAuthCli::parse();

    match cli.command {
        Commands::Run(args) => run_server(args).await,
        Commands::Keygen => {
            keygen();
            Ok(())
        }
        Commands::SignChallenge(args) => sign_challenge(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the API server, the metrics endpoint and the sweeper.
async fn run_server(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "nostr_auth_server=info,nostr_auth=info,tower_http=info",
        args.log_format.into(),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        public_url = %args.public_url,
        data_dir = %args.data_dir.display(),
        "starting nostr-auth-server"
    );

    // --- Persistent storage ---
    std::fs::create_dir_all(&args.data_dir).with_context(|| {
        format!("failed to create data directory: {}", args.data_dir.display())
    })?;
    let db_path = args.data_dir.join("db");
    let db = AuthDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Metrics ---
    let auth_metrics = Arc::new(AuthMetrics::new());

    // --- Application state ---
    let options = api::ServiceOptions {
        auth: AuthConfig {
            challenge_ttl: Duration::from_secs(args.challenge_ttl),
            proof_window: Duration::from_secs(args.proof_window),
            default_relay: args.relay.clone(),
        },
        public_url: args.public_url.clone(),
        proof_replay_cache: args.proof_replay_cache,
        dev_sessions: args.dev_sessions,
    };
    let app_state = api::AppState::new(&db, options, Arc::clone(&auth_metrics))
        .context("failed to open auth stores")?;

    // --- API server ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&auth_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Sweeper ---
    let sweep_state = app_state.clone();
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHALLENGE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweep_state.sweep(unix_now());
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    sweeper.abort();
    db.flush().context("failed to flush database")?;
    tracing::info!("nostr-auth-server stopped");
    Ok(())
}

/// Prints a fresh key pair. The secret goes to stdout, so pipe it somewhere
/// safe.
fn keygen() {
    let keys = Keys::generate();
    println!("secret  {}", keys.secret_key_hex());
    println!("pubkey  {}", keys.public_key_hex());
    println!("npub    {}", keys.npub());
}

/// Signs a kind-22242 challenge response and prints it as JSON, ready to
/// paste into a login or link request as `signedEvent`.
fn sign_challenge(args: cli::SignChallengeArgs) -> Result<()> {
    let keys = Keys::from_secret_hex(&args.secret_key).context("invalid secret key")?;
    let event = EventBuilder::auth_response(&args.challenge, args.relay.as_deref())
        .build()
        .sign(&keys)
        .context("failed to sign challenge response")?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

fn print_version() {
    println!("nostr-auth-server {}", env!("CARGO_PKG_VERSION"));
    println!("rustc             {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
