// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the relay hub.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "relayhub", version, about = "Operator/agent command relay hub")]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "RELAYHUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9900, env = "RELAYHUB_PORT")]
    pub port: u16,

    /// Bearer token for HTTP and WebSocket auth. If unset, auth is disabled.
    #[arg(long, env = "RELAYHUB_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Root directory of the per-agent upload trees.
    #[arg(long, default_value = "uploads", env = "RELAYHUB_UPLOAD_ROOT")]
    pub upload_root: PathBuf,

    /// Directory for staged multipart files (defaults to `<upload-root>/.staging`).
    #[arg(long, env = "RELAYHUB_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Maximum number of files accepted in one upload batch.
    #[arg(long, default_value_t = 1000, env = "RELAYHUB_MAX_UPLOAD_FILES")]
    pub max_upload_files: usize,

    /// Expire pending commands after this many seconds (0 disables expiry).
    #[arg(long, default_value_t = 0, env = "RELAYHUB_PENDING_TTL_SECS")]
    pub pending_ttl_secs: u64,

    /// Pending command sweep interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "RELAYHUB_SWEEP_INTERVAL_MS")]
    pub sweep_interval_ms: u64,

    /// Number of health records kept in memory.
    #[arg(long, default_value_t = 1000, env = "RELAYHUB_HEALTH_HISTORY")]
    pub health_history: usize,

    /// Resolve reporter IP addresses to a geolocation.
    #[arg(long, env = "RELAYHUB_GEO_LOOKUP")]
    pub geo_lookup: bool,

    /// Base URL of the IP geolocation service.
    #[arg(long, default_value = "http://ip-api.com/json", env = "RELAYHUB_GEO_ENDPOINT")]
    pub geo_endpoint: String,

    /// Log format (text or json).
    #[arg(long, default_value = "text", env = "RELAYHUB_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAYHUB_LOG_LEVEL")]
    pub log_level: String,
}

impl HubConfig {
    /// Reject settings that cannot work together.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "text" | "json") {
            anyhow::bail!("--log-format must be text or json, got {:?}", self.log_format);
        }
        if self.max_upload_files == 0 {
            anyhow::bail!("--max-upload-files must be at least 1");
        }
        if self.upload_root.as_os_str().is_empty() {
            anyhow::bail!("--upload-root must not be empty");
        }
        Ok(())
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(|| self.upload_root.join(".staging"))
    }

    /// Pending command TTL, or `None` when expiry is disabled.
    pub fn pending_ttl(&self) -> Option<Duration> {
        (self.pending_ttl_secs > 0).then(|| Duration::from_secs(self.pending_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
