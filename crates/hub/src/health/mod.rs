// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health-report intake: agents post host details, the hub records them with
//! the caller's address and an optional location, then notifies operators.

pub mod geo;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::relay::Relay;

pub use geo::{GeoLocator, GeoPosition, IpApiLocator, NoGeo};
pub use store::{HealthStore, MemoryHealthStore};

/// Event name used when notifying operators of a new record.
pub const HEALTH_EVENT: &str = "health-check";

fn unknown() -> String {
    "unknown".to_owned()
}

/// Host details supplied by the reporter. Missing fields read as `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    #[serde(default = "unknown")]
    pub hostname: String,
    #[serde(default = "unknown")]
    pub username: String,
    #[serde(default = "unknown")]
    pub os_type: String,
    #[serde(default = "unknown")]
    pub os_release: String,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self { hostname: unknown(), username: unknown(), os_type: unknown(), os_release: unknown() }
    }
}

/// A stored health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub id: String,
    pub status: String,
    pub message: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub hostname: String,
    pub username: String,
    pub os_type: String,
    pub os_release: String,
    pub ip_address: String,
    pub remote_position: Option<GeoPosition>,
}

impl HealthRecord {
    pub fn new(report: HealthReport, ip_address: String, remote_position: Option<GeoPosition>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: "ok".to_owned(),
            message: "Server is running".to_owned(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            hostname: report.hostname,
            username: report.username,
            os_type: report.os_type,
            os_release: report.os_release,
            ip_address,
            remote_position,
        }
    }
}

/// Caller address: first `x-forwarded-for` hop, else the socket peer.
/// IPv4-mapped IPv6 addresses are reported in dotted form.
pub fn remote_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let raw = match (forwarded, peer) {
        (Some(ip), _) => ip.to_owned(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => return unknown(),
    };
    match raw.strip_prefix("::ffff:") {
        Some(v4) => v4.to_owned(),
        None => raw,
    }
}

/// Records reports and announces them.
#[derive(Clone)]
pub struct HealthService {
    store: Arc<dyn HealthStore>,
    geo: Arc<dyn GeoLocator>,
}

impl HealthService {
    pub fn new(store: Arc<dyn HealthStore>, geo: Arc<dyn GeoLocator>) -> Self {
        Self { store, geo }
    }

    pub fn store(&self) -> &dyn HealthStore {
        self.store.as_ref()
    }

    /// Locate, persist, then broadcast one report.
    pub async fn record(&self, report: HealthReport, ip: String, relay: &Relay) -> HealthRecord {
        let position = self.geo.locate(&ip).await;
        let record = HealthRecord::new(report, ip, position);
        self.store.save(record.clone());

        match serde_json::to_value(&record) {
            Ok(payload) => {
                let report = relay.broadcast(HEALTH_EVENT, payload);
                tracing::info!(
                    hostname = %record.hostname,
                    ip = %record.ip_address,
                    notified = report.delivered,
                    "health report recorded"
                );
            }
            Err(e) => tracing::warn!(err = %e, "failed to encode health record"),
        }
        record
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
