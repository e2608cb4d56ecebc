// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relayhub: routes commands from operator consoles to remote agents and
//! receives the files agents upload back.

pub mod config;
pub mod correlation;
pub mod error;
pub mod fanout;
pub mod health;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod state;
pub mod test_support;
pub mod transport;
pub mod upload;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::relay::spawn_pending_sweeper;
use crate::state::AppState;
use crate::transport::build_router;

/// Run the hub until Ctrl-C.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    config.validate()?;
    // reqwest is built without a default crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState::new(config, shutdown.clone()));
    state.uploads.prepare().await.with_context(|| {
        format!("failed to create upload root {}", state.uploads.root().display())
    })?;

    spawn_pending_sweeper(Arc::clone(&state));
    spawn_ctrl_c(shutdown.clone());

    let listener = TcpListener::bind(&addr).await.with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        root = %state.uploads.root().display(),
        auth = state.config.auth_token.is_some(),
        "relayhub listening on {addr}"
    );

    let router = build_router(state);
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("relayhub stopped");
    Ok(())
}

fn spawn_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                shutdown.cancel();
            }
            Err(e) => tracing::warn!(err = %e, "failed to install ctrl-c handler"),
        }
    });
}
