// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection message types for the hub's real-time protocol.
//!
//! Frames are internally-tagged JSON (`{"type": "register-agent", ...}`).
//! [`ClientMessage`] covers everything an agent or operator may send;
//! [`ServerMessage`] covers everything the hub pushes back.

use serde::{Deserialize, Serialize};

/// Transport-assigned identity of one live connection.
pub type ConnectionId = String;

/// Correlation token binding a dispatched command to its result.
pub type CommandId = String;

/// Role a connection registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    Operator,
}

/// Public view of a registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: ConnectionId,
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Client -> Hub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    RegisterAgent {
        #[serde(default)]
        metadata: serde_json::Value,
    },
    RegisterOperator {},
    DispatchCommand {
        target_agent_id: ConnectionId,
        payload: serde_json::Value,
    },
    CommandResult {
        command_id: CommandId,
        #[serde(default)]
        result: serde_json::Value,
        #[serde(default)]
        error: Option<serde_json::Value>,
    },
    Ping {},
}

// ---------------------------------------------------------------------------
// Hub -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    RegistrationAck {
        id: ConnectionId,
        role: Role,
    },
    /// Full agent snapshot sent to an operator at registration.
    AgentList {
        agents: Vec<AgentInfo>,
    },
    AgentConnected {
        id: ConnectionId,
        metadata: serde_json::Value,
    },
    AgentDisconnected {
        id: ConnectionId,
        metadata: serde_json::Value,
    },
    /// A command delivered to its target agent.
    CommandForwarded {
        command_id: CommandId,
        payload: serde_json::Value,
    },
    CommandAccepted {
        command_id: CommandId,
        target_agent_id: ConnectionId,
    },
    CommandFailed {
        reason: String,
        target_agent_id: ConnectionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<CommandId>,
    },
    CommandResponse {
        command_id: CommandId,
        target_agent_id: ConnectionId,
        result: serde_json::Value,
        error: Option<serde_json::Value>,
    },
    /// Externally-originated event passed through to operators unchanged.
    Notification {
        event: String,
        payload: serde_json::Value,
    },
    Error {
        code: String,
        message: String,
    },
    Pong {},
}

impl ServerMessage {
    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegistrationAck { .. } => "registration-ack",
            Self::AgentList { .. } => "agent-list",
            Self::AgentConnected { .. } => "agent-connected",
            Self::AgentDisconnected { .. } => "agent-disconnected",
            Self::CommandForwarded { .. } => "command-forwarded",
            Self::CommandAccepted { .. } => "command-accepted",
            Self::CommandFailed { .. } => "command-failed",
            Self::CommandResponse { .. } => "command-response",
            Self::Notification { .. } => "notification",
            Self::Error { .. } => "error",
            Self::Pong {} => "pong",
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
