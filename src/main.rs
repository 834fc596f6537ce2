// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relational_key_custody::{
    api::router,
    audit::{AuditEvent, AuditEventType},
    ceremony::CeremonySweeper,
    clock::{Clock, SystemClock},
    config::{CustodyConfig, LogFormat, DEFAULT_LOG_FILTER},
    guardians::GuardianRegistry,
    seal::SealManager,
    state::AppState,
    vault::{PersonaVault, VaultPaths},
};

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut config = match CustodyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    match run(&mut config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &mut CustodyConfig) -> Result<(), Box<dyn std::error::Error>> {
    let paths = VaultPaths::new(&config.data_dir);
    let vault = Arc::new(PersonaVault::open(paths.clone())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(GuardianRegistry::open_with_clock(
        &paths.guardian_db(),
        clock.clone(),
    )?);

    let bootstrapped = config.has_bootstrap_mek();
    let seal = Arc::new(SealManager::boot(config.take_bootstrap_mek(), clock));

    let state = AppState::new(seal, registry, vault, config.ceremony_ttl_chrono());
    if bootstrapped {
        state.audit.record(
            AuditEvent::new(AuditEventType::SealOpened)
                .with_actor("system")
                .with_details(serde_json::json!({ "via": "bootstrap" })),
        );
    }

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(
        CeremonySweeper::new(state.ceremonies.clone())
            .with_interval(config.sweep_interval)
            .run(shutdown.clone()),
    );

    let app = router(state);
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        "Key custody server listening (docs at /docs)"
    );

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    sweeper.await?;
    Ok(())
}
