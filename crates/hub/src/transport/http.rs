// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the relay hub.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::Field;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, Multipart, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::correlation::CommandKind;
use crate::error::HubError;
use crate::health::{remote_ip, HealthRecord, HealthReport};
use crate::protocol::AgentInfo;
use crate::state::AppState;
use crate::upload::resolve::validate_hostname;
use crate::upload::{FileOutcome, StagedFile, UploadStore};

/// Header naming the uploading agent's directory.
pub const HOSTNAME_HEADER: &str = "x-hostname";

const DEFAULT_RECORD_LIMIT: usize = 100;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: String,
    pub message: String,
    pub timestamp: String,
    pub agents: usize,
    pub operators: usize,
}

#[derive(Debug, Serialize)]
pub struct AgentsResponse {
    pub agents: Vec<AgentInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<FileOutcome>,
    pub received_hostname: String,
    pub total_files: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default, alias = "clientSocketId")]
    pub agent_connection_id: String,
    #[serde(default, alias = "adminSocketId")]
    pub operator_connection_id: Option<String>,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequestResponse {
    pub message: String,
    pub command_id: String,
    pub path: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub hostname: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub records: Vec<HealthRecord>,
    pub count: usize,
}

/// Socket peer address when the server was started with connect info.
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for PeerAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|c| c.0)))
    }
}

type Rejection = (HubError, String);

fn reject((code, message): Rejection) -> Response {
    code.to_http_response(message).into_response()
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn liveness(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = s.relay.registry();
    Json(LivenessResponse {
        status: "ok".to_owned(),
        message: "Server is running".to_owned(),
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        agents: registry.agent_count(),
        operators: registry.operator_count(),
    })
}

/// `GET /api/v1/agents`
pub async fn list_agents(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(AgentsResponse { agents: s.relay.registry().agents() })
}

/// `POST /upload`: receive a batch of files from an agent.
pub async fn upload(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let hostname = match headers.get(HOSTNAME_HEADER).map(|v| v.to_str()) {
        Some(Ok(h)) => h.to_owned(),
        Some(Err(_)) => {
            return HubError::BadRequest
                .to_http_response("x-hostname header is not valid text")
                .into_response()
        }
        None => {
            return HubError::BadRequest
                .to_http_response("missing x-hostname header")
                .into_response()
        }
    };
    if let Err(e) = validate_hostname(&hostname) {
        return e.code().to_http_response(e.to_string()).into_response();
    }

    let (files, path_fields) =
        match receive_batch(&s.uploads, multipart, s.config.max_upload_files).await {
            Ok(batch) => batch,
            Err(r) => return reject(r),
        };
    let save_paths = match parse_save_paths(path_fields) {
        Ok(p) => p,
        Err(msg) => return HubError::BadRequest.to_http_response(msg).into_response(),
    };

    let total = files.len();
    tracing::info!(hostname = %hostname, total, "upload batch received");
    let outcomes = s.uploads.place_batch(&hostname, files, &save_paths).await;

    Json(UploadResponse {
        message: "Files uploaded and moved successfully".to_owned(),
        files: outcomes,
        received_hostname: hostname,
        total_files: total,
    })
    .into_response()
}

/// Drain the multipart body: `files` parts are staged to disk, `savePaths`
/// parts are collected as text, anything else is skipped.
async fn receive_batch(
    store: &UploadStore,
    mut multipart: Multipart,
    max_files: usize,
) -> Result<(Vec<StagedFile>, Vec<String>), Rejection> {
    let mut files = Vec::new();
    let mut save_paths = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return Err((HubError::BadRequest, format!("malformed multipart body: {e}"))),
        };
        match field.name() {
            Some("files") => {
                if files.len() >= max_files {
                    return Err((
                        HubError::BadRequest,
                        format!("too many files (maximum {max_files})"),
                    ));
                }
                files.push(stage_field(store, field).await?);
            }
            Some("savePaths") => {
                let text = field.text().await.map_err(|e| {
                    (HubError::BadRequest, format!("malformed savePaths field: {e}"))
                })?;
                save_paths.push(text);
            }
            _ => {}
        }
    }
    Ok((files, save_paths))
}

/// Stream one file part into the staging directory.
async fn stage_field(store: &UploadStore, mut field: Field<'_>) -> Result<StagedFile, Rejection> {
    let name = field.file_name().unwrap_or_default().to_owned();
    let (staged, mut file) = store.stage(&name).map_err(|e| {
        tracing::warn!(err = %e, "failed to create staged file");
        (HubError::IoFailure, format!("failed to stage upload: {e}"))
    })?;

    let io_failure = |e: std::io::Error| (HubError::IoFailure, format!("failed to stage upload: {e}"));
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => file.write_all(&chunk).await.map_err(io_failure)?,
            Ok(None) => break,
            Err(e) => {
                return Err((HubError::BadRequest, format!("error reading upload {name:?}: {e}")))
            }
        }
    }
    file.flush().await.map_err(io_failure)?;
    Ok(staged)
}

/// Repeated text fields are used as given; a single field must hold a JSON
/// array. Non-string array entries fall back to the file's own name.
fn parse_save_paths(fields: Vec<String>) -> Result<Vec<String>, &'static str> {
    match fields.len() {
        0 => Err("No savePaths provided"),
        1 => {
            let parsed: Vec<serde_json::Value> =
                serde_json::from_str(&fields[0]).map_err(|_| "Invalid savePaths JSON")?;
            Ok(parsed.into_iter().map(|v| v.as_str().unwrap_or_default().to_owned()).collect())
        }
        _ => Ok(fields),
    }
}

/// `POST /upload/request`: ask an agent to upload a path.
pub async fn upload_request(
    State(s): State<Arc<AppState>>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => return HubError::BadRequest.to_http_response(e.body_text()).into_response(),
    };
    if req.agent_connection_id.is_empty() || req.path.is_empty() {
        return HubError::BadRequest
            .to_http_response("Missing required fields: agentConnectionId and path")
            .into_response();
    }

    let command = serde_json::json!({ "type": "upload", "path": req.path });
    let operator = req.operator_connection_id.as_deref().filter(|o| !o.is_empty());
    match s.relay.dispatch(&req.agent_connection_id, command, operator, CommandKind::Upload) {
        Ok(command_id) => {
            tracing::info!(
                agent_id = %req.agent_connection_id,
                command_id = %command_id,
                path = %req.path,
                "upload requested"
            );
            (
                StatusCode::ACCEPTED,
                Json(UploadRequestResponse {
                    message: "Upload request sent to client".to_owned(),
                    command_id,
                    path: req.path,
                    status: "initiated".to_owned(),
                }),
            )
                .into_response()
        }
        Err(code) => code.to_http_response(code.default_message()).into_response(),
    }
}

/// `GET /health/check`: report via query string.
pub async fn health_check_query(
    State(s): State<Arc<AppState>>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    Query(report): Query<HealthReport>,
) -> impl IntoResponse {
    let ip = remote_ip(&headers, peer);
    Json(s.health.record(report, ip, &s.relay).await)
}

/// `POST /health/check`: report via JSON body. An empty body is an
/// all-unknown report.
pub async fn health_check_body(
    State(s): State<Arc<AppState>>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let report = if body.iter().all(u8::is_ascii_whitespace) {
        HealthReport::default()
    } else {
        match serde_json::from_slice::<HealthReport>(&body) {
            Ok(r) => r,
            Err(e) => {
                return HubError::BadRequest
                    .to_http_response(format!("invalid health report: {e}"))
                    .into_response()
            }
        }
    };
    let ip = remote_ip(&headers, peer);
    Json(s.health.record(report, ip, &s.relay).await).into_response()
}

/// `GET /health/records`
pub async fn health_records(
    State(s): State<Arc<AppState>>,
    Query(q): Query<RecordsQuery>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(DEFAULT_RECORD_LIMIT);
    let records = s.health.store().list(q.hostname.as_deref(), limit);
    Json(RecordsResponse { count: records.len(), records })
}

/// `GET /health/records/{id}`
pub async fn health_record(State(s): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match s.health.store().get(&id) {
        Some(record) => Json(record).into_response(),
        None => HubError::NotFound.to_http_response("health record not found").into_response(),
    }
}

/// Any unmatched route.
pub async fn not_found(uri: Uri) -> Response {
    HubError::NotFound.to_http_response(format!("route not found: {}", uri.path())).into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
