// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the hub API, shared by HTTP responses and WebSocket frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubError {
    Unauthorized,
    BadRequest,
    AgentNotFound,
    OperatorNotFound,
    NotFound,
    PathTraversal,
    IoFailure,
    Internal,
}

impl HubError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::AgentNotFound => 404,
            Self::OperatorNotFound => 404,
            Self::NotFound => 404,
            Self::PathTraversal => 400,
            Self::IoFailure => 500,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::AgentNotFound => "AGENT_NOT_FOUND",
            Self::OperatorNotFound => "OPERATOR_NOT_FOUND",
            Self::NotFound => "NOT_FOUND",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::IoFailure => "IO_FAILURE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Human-readable default message, used where the caller has nothing better.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::BadRequest => "bad request",
            Self::AgentNotFound => "agent not found or disconnected",
            Self::OperatorNotFound => "operator not found or disconnected",
            Self::NotFound => "not found",
            Self::PathTraversal => "path escapes the upload root",
            Self::IoFailure => "filesystem operation failed",
            Self::Internal => "internal error",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for HubError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
