// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers shared by unit and integration tests.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::state::AppState;

/// Config with an upload root under `dir`, auth off and geo lookups disabled.
pub fn test_config(dir: &Path) -> HubConfig {
    HubConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        auth_token: None,
        upload_root: dir.join("uploads"),
        staging_dir: None,
        max_upload_files: 1000,
        pending_ttl_secs: 0,
        sweep_interval_ms: 5000,
        health_history: 100,
        geo_lookup: false,
        geo_endpoint: "http://127.0.0.1:9".to_owned(),
        log_format: "text".to_owned(),
        log_level: "debug".to_owned(),
    }
}

/// Build state for `config` and create its upload directories.
pub async fn test_state(config: HubConfig) -> anyhow::Result<Arc<AppState>> {
    let state = AppState::new(config, CancellationToken::new());
    state.uploads.prepare().await?;
    Ok(Arc::new(state))
}

/// Spawn the hub router on a random local port.
pub async fn spawn_http_server(
    state: Arc<AppState>,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let router = crate::transport::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await;
    });
    Ok((addr, handle))
}
