mod cli;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use userdir_core::{load_dotenv, DirectoryConfig};
use userdir_directory::{UserDirectory, UserStore};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = resolve_config(&args);
    config.log_summary();

    match args.command {
        Command::Check => check(config),
        Command::Lookup { id, username } => lookup(config, id, username),
        Command::Watch { health_interval } => watch(config, health_interval).await,
    }
}

/// Env-derived config with command-line overrides applied.
fn resolve_config(args: &CliArgs) -> DirectoryConfig {
    let mut config = DirectoryConfig::from_lookup(&args.profile, |key| std::env::var(key).ok());
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if args.recursive {
        config.recursive = true;
    }
    config
}

fn open(config: DirectoryConfig) -> Result<UserStore> {
    let path = config.data_dir.clone();
    UserStore::open(config)
        .with_context(|| format!("could not load users from {}", path.display()))
}

fn check(config: DirectoryConfig) -> Result<()> {
    let store = open(config)?;
    let snapshot = store.directory().snapshot();

    let mut ids: Vec<&str> = snapshot.ids().collect();
    ids.sort_unstable();
    let files: Vec<String> = snapshot
        .files()
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    let report = json!({
        "users": snapshot.len(),
        "files": files,
        "ids": ids,
        "loaded_at": snapshot.loaded_at(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn lookup(config: DirectoryConfig, id: Option<String>, username: Option<String>) -> Result<()> {
    let store = open(config)?;
    let (user, key) = match (id, username) {
        (Some(id), _) => (store.user_by_id(&id), format!("id {}", id)),
        (None, Some(username)) => (store.user_by_username(&username), format!("username {}", username)),
        (None, None) => bail!("either --id or --username is required"),
    };

    match user {
        Some(user) => {
            println!("{}", serde_json::to_string_pretty(&user.redacted())?);
            Ok(())
        }
        None => bail!("no user with {}", key),
    }
}

async fn watch(config: DirectoryConfig, health_interval: u64) -> Result<()> {
    let store = open(config)?;
    let watcher = store.watch().context("failed to start file watcher")?;
    info!(
        users = store.directory().len(),
        client_id = store.example_client_id(),
        "user directory ready"
    );

    let health_loop = async {
        if health_interval == 0 {
            return std::future::pending::<()>().await;
        }
        let mut ticker = tokio::time::interval(Duration::from_secs(health_interval));
        // Skip the immediate first tick.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let health = store.health();
            match &health.last_error {
                None => info!(generation = health.generation, users = health.users, "directory healthy"),
                Some(failure) => warn!(
                    generation = health.generation,
                    users = health.users,
                    attempt = failure.attempt,
                    error = %failure.message,
                    "directory degraded, serving last good snapshot"
                ),
            }
        }
    };

    tokio::select! {
        _ = os_signal() => info!("shutdown signal received"),
        _ = health_loop => {}
    }

    watcher.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&store.health())?);
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "could not register signal handlers, falling back to ctrl_c");
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl_c");
        std::future::pending::<()>().await;
    }
}
