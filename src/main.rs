mod config;
mod engine;
mod gate;
mod health;
mod program;
mod reconcile;
mod schedule;
mod secrets;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use thermostat_api::auth::{CommandLoginProvider, TokenCache};
use thermostat_api::client::VendorClient;

#[tokio::main]
async fn main() -> Result<()> {
    secrets::load()?;
    let cfg = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        interval_minutes = cfg.check_interval.as_secs() / 60,
        schedule = %cfg.schedule_file.display(),
        "starting thermostat control service"
    );

    // An invalid schedule must stop the service here, not silently fall
    // back to defaults mid-run.
    let store = schedule::ScheduleStore::new(&cfg.schedule_file);
    let initial = store
        .load()
        .context("schedule failed validation, refusing to start")?;
    info!(timezone = %initial.timezone, "schedule validated");

    let primed = TokenCache::load(&cfg.token_cache_file)
        .ok()
        .map(|cache| cache.credential());
    if primed.is_some() {
        info!("primed credential from token cache");
    }
    let provider = CommandLoginProvider::new(
        cfg.login_command.clone(),
        cfg.token_cache_file.clone(),
        cfg.login_timeout,
    );
    let gate = gate::CredentialGate::new(provider, primed);

    let api = VendorClient::new(&cfg.api_base_url)?;

    let health = health::HealthHandle::new(cfg.error_threshold);
    tokio::spawn({
        let handle = health.clone();
        let port = cfg.health_port;
        async move {
            if let Err(e) = health::serve(handle, port).await {
                error!(error = %e, "health server failed");
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    reconcile::Reconciler::new(store, api, gate, health)
        .run(cfg.check_interval, shutdown_rx)
        .await;

    info!("service stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received interrupt"),
                _ = term.recv() => info!("received SIGTERM"),
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            info!("received interrupt");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received interrupt");
}
