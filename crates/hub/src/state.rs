// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::health::{GeoLocator, HealthService, IpApiLocator, MemoryHealthStore, NoGeo};
use crate::relay::Relay;
use crate::upload::UploadStore;

/// Shared hub state.
pub struct AppState {
    pub config: HubConfig,
    pub relay: Relay,
    pub uploads: UploadStore,
    pub health: HealthService,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build state with the collaborators selected by `config`.
    pub fn new(config: HubConfig, shutdown: CancellationToken) -> Self {
        let uploads = UploadStore::new(config.upload_root.clone(), config.staging_dir());
        let geo: Arc<dyn GeoLocator> = if config.geo_lookup {
            Arc::new(IpApiLocator::new(config.geo_endpoint.clone()))
        } else {
            Arc::new(NoGeo)
        };
        let health =
            HealthService::new(Arc::new(MemoryHealthStore::new(config.health_history)), geo);
        Self::with_parts(config, uploads, health, shutdown)
    }

    pub fn with_parts(
        config: HubConfig,
        uploads: UploadStore,
        health: HealthService,
        shutdown: CancellationToken,
    ) -> Self {
        Self { config, relay: Relay::new(), uploads, health, shutdown }
    }
}
