// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the hub HTTP API.
//!
//! Uses `axum_test::TestServer`, no real TCP needed.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::json;
use tokio::sync::mpsc::Receiver;

use relayhub::config::HubConfig;
use relayhub::fanout::ConnectionHandle;
use relayhub::protocol::ServerMessage;
use relayhub::state::AppState;
use relayhub::test_support::{test_config, test_state};
use relayhub::transport::build_router;

const HOSTNAME: HeaderName = HeaderName::from_static("x-hostname");

async fn server_with(config: HubConfig) -> anyhow::Result<(TestServer, Arc<AppState>)> {
    let state = test_state(config).await?;
    let server = TestServer::new(build_router(Arc::clone(&state)))?;
    Ok((server, state))
}

fn file_part(name: &str, body: &str) -> Part {
    Part::bytes(body.as_bytes().to_vec()).file_name(name.to_owned()).mime_type("text/plain")
}

fn drain(rx: &mut Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

// -- Liveness -----------------------------------------------------------------

#[tokio::test]
async fn liveness_reports_counts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;
    let (agent, _rx) = ConnectionHandle::channel();
    state.relay.register_agent("a1".to_owned(), json!({}), agent);

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agents"], 1);
    assert_eq!(body["operators"], 0);
    Ok(())
}

#[tokio::test]
async fn agents_endpoint_lists_registered_agents() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;
    let (a1, _rx1) = ConnectionHandle::channel();
    let (a2, _rx2) = ConnectionHandle::channel();
    state.relay.register_agent("a1".to_owned(), json!({"hostname": "h1"}), a1);
    state.relay.register_agent("a2".to_owned(), json!({"hostname": "h2"}), a2);

    let body: serde_json::Value = server.get("/api/v1/agents").await.json();
    assert_eq!(
        body["agents"],
        json!([
            {"id": "a1", "metadata": {"hostname": "h1"}},
            {"id": "a2", "metadata": {"hostname": "h2"}},
        ])
    );
    Ok(())
}

// -- Auth ---------------------------------------------------------------------

#[tokio::test]
async fn bearer_required_except_liveness() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = test_config(dir.path());
    config.auth_token = Some("secret".to_owned());
    let (server, _state) = server_with(config).await?;

    server.get("/health").await.assert_status_ok();

    let resp = server.get("/api/v1/agents").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    server
        .get("/api/v1/agents")
        .add_header(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer secret"),
        )
        .await
        .assert_status_ok();
    Ok(())
}

// -- Upload batch -------------------------------------------------------------

#[tokio::test]
async fn upload_places_files_under_hostname() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;

    let form = MultipartForm::new()
        .add_text("savePaths", r#"["C:\\Users\\me\\notes.txt", "../../etc/passwd"]"#)
        .add_part("files", file_part("notes.txt", "n"))
        .add_part("files", file_part("passwd", "p"));

    let resp = server
        .post("/upload")
        .add_header(HOSTNAME, HeaderValue::from_static("laptop-1"))
        .multipart(form)
        .await;
    resp.assert_status_ok();

    let agent_dir = state.uploads.root().join("laptop-1");
    let body: serde_json::Value = resp.json();
    assert_eq!(body["receivedHostname"], "laptop-1");
    assert_eq!(body["totalFiles"], 2);
    assert_eq!(body["files"][0]["original"], "notes.txt");
    assert_eq!(
        body["files"][0]["savedTo"],
        agent_dir.join("Users/me/notes.txt").display().to_string()
    );
    assert_eq!(
        body["files"][1]["savedTo"],
        agent_dir.join("etc/passwd").display().to_string()
    );

    assert_eq!(tokio::fs::read_to_string(agent_dir.join("Users/me/notes.txt")).await?, "n");
    assert_eq!(tokio::fs::read_to_string(agent_dir.join("etc/passwd")).await?, "p");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn upload_batch_reports_failed_file_alongside_placed_ones() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;
    let outside = dir.path().join("outside");
    let agent_dir = state.uploads.root().join("h1");
    tokio::fs::create_dir_all(&outside).await?;
    tokio::fs::create_dir_all(&agent_dir).await?;
    std::os::unix::fs::symlink(&outside, agent_dir.join("escape"))?;

    let form = MultipartForm::new()
        .add_text("savePaths", r#"["a/one.txt", "escape/two.txt", "b/three.txt"]"#)
        .add_part("files", file_part("one.txt", "1"))
        .add_part("files", file_part("two.txt", "2"))
        .add_part("files", file_part("three.txt", "3"));

    let resp = server
        .post("/upload")
        .add_header(HOSTNAME, HeaderValue::from_static("h1"))
        .multipart(form)
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["totalFiles"], 3);
    assert_eq!(body["files"][0]["savedTo"], agent_dir.join("a/one.txt").display().to_string());
    assert_eq!(body["files"][1]["original"], "two.txt");
    assert!(body["files"][1].get("savedTo").is_none());
    assert!(
        body["files"][1]["error"].as_str().is_some_and(|e| e.contains("Path traversal")),
        "{body}"
    );
    assert_eq!(body["files"][2]["savedTo"], agent_dir.join("b/three.txt").display().to_string());

    assert!(!outside.join("two.txt").exists());
    assert_eq!(tokio::fs::read_to_string(agent_dir.join("b/three.txt")).await?, "3");
    Ok(())
}

#[tokio::test]
async fn upload_accepts_repeated_save_path_fields() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;

    let form = MultipartForm::new()
        .add_part("files", file_part("a.txt", "a"))
        .add_part("files", file_part("b.txt", "b"))
        .add_text("savePaths", "x/a.txt")
        .add_text("savePaths", "y/b.txt");

    let resp = server
        .post("/upload")
        .add_header(HOSTNAME, HeaderValue::from_static("h1"))
        .multipart(form)
        .await;
    resp.assert_status_ok();

    let root = state.uploads.root().join("h1");
    assert!(root.join("x/a.txt").exists());
    assert!(root.join("y/b.txt").exists());
    Ok(())
}

#[tokio::test]
async fn upload_without_save_paths_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;

    let form = MultipartForm::new().add_part("files", file_part("a.txt", "a"));
    let resp = server
        .post("/upload")
        .add_header(HOSTNAME, HeaderValue::from_static("h1"))
        .multipart(form)
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["message"], "No savePaths provided");
    assert!(!state.uploads.root().join("h1").exists());

    let mut staged = tokio::fs::read_dir(state.uploads.staging()).await?;
    assert!(staged.next_entry().await?.is_none(), "staged files left behind");
    Ok(())
}

#[tokio::test]
async fn upload_with_invalid_save_paths_json_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, _state) = server_with(test_config(dir.path())).await?;

    let form = MultipartForm::new()
        .add_text("savePaths", "[broken")
        .add_part("files", file_part("a.txt", "a"));
    let resp = server
        .post("/upload")
        .add_header(HOSTNAME, HeaderValue::from_static("h1"))
        .multipart(form)
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["message"], "Invalid savePaths JSON");
    Ok(())
}

#[tokio::test]
async fn upload_with_bad_hostname_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, _state) = server_with(test_config(dir.path())).await?;

    for hostname in [None, Some(".."), Some("a/b"), Some(".staging")] {
        let form = MultipartForm::new()
            .add_text("savePaths", "[]")
            .add_part("files", file_part("a.txt", "a"));
        let mut req = server.post("/upload");
        if let Some(h) = hostname {
            req = req.add_header(HOSTNAME, HeaderValue::from_static(h));
        }
        let resp = req.multipart(form).await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST, "hostname {hostname:?}");
    }
    Ok(())
}

#[tokio::test]
async fn upload_over_file_limit_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = test_config(dir.path());
    config.max_upload_files = 1;
    let (server, _state) = server_with(config).await?;

    let form = MultipartForm::new()
        .add_text("savePaths", "[]")
        .add_part("files", file_part("a.txt", "a"))
        .add_part("files", file_part("b.txt", "b"));
    let resp = server
        .post("/upload")
        .add_header(HOSTNAME, HeaderValue::from_static("h1"))
        .multipart(form)
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

// -- Upload request -----------------------------------------------------------

#[tokio::test]
async fn upload_request_dispatches_to_agent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;
    let (agent, mut agent_rx) = ConnectionHandle::channel();
    let (op, mut op_rx) = ConnectionHandle::channel();
    state.relay.register_agent("a1".to_owned(), json!({}), agent);
    state.relay.register_operator("o1".to_owned(), op);
    drain(&mut op_rx);

    let resp = server
        .post("/upload/request")
        .json(&json!({"clientSocketId": "a1", "adminSocketId": "o1", "path": "/var/log/app.log"}))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "initiated");
    assert_eq!(body["path"], "/var/log/app.log");
    let command_id = body["commandId"].as_str().unwrap_or_default().to_owned();
    assert!(command_id.starts_with("upload_"), "{command_id}");

    assert_eq!(
        drain(&mut agent_rx),
        vec![ServerMessage::CommandForwarded {
            command_id: command_id.clone(),
            payload: json!({"type": "upload", "path": "/var/log/app.log"}),
        }]
    );

    state.relay.resolve_result(&command_id, json!({"ok": true}), None);
    assert_eq!(
        drain(&mut op_rx),
        vec![ServerMessage::CommandResponse {
            command_id,
            target_agent_id: "a1".to_owned(),
            result: json!({"ok": true}),
            error: None,
        }]
    );
    Ok(())
}

#[tokio::test]
async fn upload_request_without_operator_is_fire_and_forget() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;
    let (agent, _agent_rx) = ConnectionHandle::channel();
    state.relay.register_agent("a1".to_owned(), json!({}), agent);

    let resp = server
        .post("/upload/request")
        .json(&json!({"agentConnectionId": "a1", "path": "/tmp/x"}))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);
    assert!(state.relay.pending().is_empty());
    Ok(())
}

#[tokio::test]
async fn upload_request_errors() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;
    let (agent, _agent_rx) = ConnectionHandle::channel();
    state.relay.register_agent("a1".to_owned(), json!({}), agent);

    let cases = [
        (json!({"clientSocketId": "ghost", "path": "/x"}), StatusCode::NOT_FOUND, "AGENT_NOT_FOUND"),
        (
            json!({"clientSocketId": "a1", "adminSocketId": "ghost", "path": "/x"}),
            StatusCode::NOT_FOUND,
            "OPERATOR_NOT_FOUND",
        ),
        (json!({"clientSocketId": "a1"}), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        (json!({"path": "/x"}), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        (json!([1, 2]), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
    ];
    for (body, status, code) in cases {
        let resp = server.post("/upload/request").json(&body).await;
        assert_eq!(resp.status_code(), status, "{body}");
        let reply: serde_json::Value = resp.json();
        assert_eq!(reply["error"]["code"], code, "{body}");
    }
    assert!(state.relay.pending().is_empty());
    Ok(())
}

// -- Health reports -----------------------------------------------------------

#[tokio::test]
async fn health_check_records_and_notifies() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, state) = server_with(test_config(dir.path())).await?;
    let (op, mut op_rx) = ConnectionHandle::channel();
    state.relay.register_operator("o1".to_owned(), op);
    drain(&mut op_rx);

    let resp = server
        .post("/health/check")
        .add_header(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("::ffff:10.0.0.8"),
        )
        .json(&json!({"hostname": "h1", "osType": "Linux"}))
        .await;
    resp.assert_status_ok();

    let record: serde_json::Value = resp.json();
    assert_eq!(record["status"], "ok");
    assert_eq!(record["hostname"], "h1");
    assert_eq!(record["osType"], "Linux");
    assert_eq!(record["username"], "unknown");
    assert_eq!(record["ipAddress"], "10.0.0.8");
    assert!(record["remotePosition"].is_null());

    match drain(&mut op_rx).as_slice() {
        [ServerMessage::Notification { event, payload }] => {
            assert_eq!(event, "health-check");
            assert_eq!(payload["id"], record["id"]);
        }
        other => anyhow::bail!("unexpected operator traffic {other:?}"),
    }

    let id = record["id"].as_str().unwrap_or_default();
    let fetched: serde_json::Value = server.get(&format!("/health/records/{id}")).await.json();
    assert_eq!(fetched, record);
    Ok(())
}

#[tokio::test]
async fn health_check_via_query_and_listing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, _state) = server_with(test_config(dir.path())).await?;

    for host in ["h1", "h2", "h1"] {
        server
            .get("/health/check")
            .add_query_param("hostname", host)
            .await
            .assert_status_ok();
    }
    server.post("/health/check").await.assert_status_ok();

    let all: serde_json::Value = server.get("/health/records").await.json();
    assert_eq!(all["count"], 4);
    assert_eq!(all["records"][0]["hostname"], "unknown");

    let h1: serde_json::Value = server
        .get("/health/records")
        .add_query_param("hostname", "h1")
        .add_query_param("limit", 1)
        .await
        .json();
    assert_eq!(h1["count"], 1);
    assert_eq!(h1["records"][0]["hostname"], "h1");
    Ok(())
}

#[tokio::test]
async fn unknown_health_record_is_404() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, _state) = server_with(test_config(dir.path())).await?;
    let resp = server.get("/health/records/nope").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn malformed_health_body_is_400() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, _state) = server_with(test_config(dir.path())).await?;
    let resp = server.post("/health/check").text("{not json").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn unknown_route_answers_with_error_envelope() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (server, _state) = server_with(test_config(dir.path())).await?;

    let resp = server.get("/no/such/route").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "route not found: /no/such/route");
    Ok(())
}
