// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command relay: dispatches operator commands to agents and routes results back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::correlation::{mint_command_id, CommandKind, PendingTable};
use crate::error::HubError;
use crate::fanout::{ConnectionHandle, FanoutReport};
use crate::protocol::{AgentInfo, CommandId, ConnectionId, Role, ServerMessage};
use crate::registry::{Registry, Unregistered};
use crate::state::AppState;

/// What happened to an agent's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Forwarded to the operator that issued the command.
    Delivered,
    /// No pending entry: already resolved, fire-and-forget, or never issued.
    Unknown,
    /// The entry existed but its operator is gone.
    Orphaned,
}

/// Owns the session registry and the correlation table.
#[derive(Debug, Default)]
pub struct Relay {
    registry: Registry,
    pending: PendingTable,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn register_agent(&self, id: ConnectionId, metadata: serde_json::Value, handle: ConnectionHandle) {
        let report = self.registry.register_agent(id.clone(), metadata, handle);
        tracing::info!(agent_id = %id, notified = report.delivered, "agent registered");
    }

    pub fn register_operator(&self, id: ConnectionId, handle: ConnectionHandle) -> Vec<AgentInfo> {
        let agents = self.registry.register_operator(id.clone(), handle);
        tracing::info!(operator_id = %id, agents = agents.len(), "operator registered");
        agents
    }

    /// Forget a closed connection. Commands owned by a departing operator are
    /// discarded; commands targeting a departing agent stay pending.
    pub fn disconnect(&self, id: &str) -> Unregistered {
        let removed = self.registry.unregister(id);
        if removed.operator {
            let dropped = self.pending.discard_operator(id);
            tracing::info!(operator_id = %id, dropped, "operator unregistered");
        }
        if removed.agent.is_some() {
            tracing::info!(agent_id = %id, "agent unregistered");
        }
        removed
    }

    /// Send `payload` to `agent_id` under a fresh command id.
    ///
    /// With an `operator_id`, the eventual result is routed back to that
    /// operator; without one the command is fire-and-forget. Never waits for
    /// the agent.
    pub fn dispatch(
        &self,
        agent_id: &str,
        payload: serde_json::Value,
        operator_id: Option<&str>,
        kind: CommandKind,
    ) -> Result<CommandId, HubError> {
        self.dispatch_inner(agent_id, payload, operator_id, kind, None)
    }

    /// Dispatch a command on behalf of a connected operator, answering on
    /// `reply`.
    ///
    /// `command-accepted` is queued on `reply` before the agent is sent the
    /// command, so the agent's result can never reach the operator ahead of
    /// it. Every failure is answered with `command-failed`.
    pub fn dispatch_from_operator(
        &self,
        operator_id: &str,
        reply: &ConnectionHandle,
        agent_id: &str,
        payload: serde_json::Value,
    ) -> Result<CommandId, HubError> {
        self.dispatch_inner(agent_id, payload, Some(operator_id), CommandKind::Command, Some(reply))
    }

    fn dispatch_inner(
        &self,
        agent_id: &str,
        payload: serde_json::Value,
        operator_id: Option<&str>,
        kind: CommandKind,
        reply: Option<&ConnectionHandle>,
    ) -> Result<CommandId, HubError> {
        let fail = |code: HubError, command_id: Option<CommandId>| -> HubError {
            if let Some(reply) = reply {
                reply.send(ServerMessage::CommandFailed {
                    reason: code.default_message().to_owned(),
                    target_agent_id: agent_id.to_owned(),
                    command_id,
                });
            }
            code
        };

        let agent = self
            .registry
            .lookup(agent_id, Role::Agent)
            .ok_or_else(|| fail(HubError::AgentNotFound, None))?;

        let command_id = match operator_id {
            Some(op) => {
                if self.registry.lookup(op, Role::Operator).is_none() {
                    return Err(fail(HubError::OperatorNotFound, None));
                }
                let command_id = self.pending.insert(kind, op, agent_id);
                // Operator may have left between lookup and insert; its
                // disconnect sweep has already run in that case.
                if self.registry.lookup(op, Role::Operator).is_none() {
                    self.pending.take(&command_id);
                    return Err(fail(HubError::OperatorNotFound, None));
                }
                command_id
            }
            None => mint_command_id(kind),
        };

        if let Some(reply) = reply {
            reply.send(ServerMessage::CommandAccepted {
                command_id: command_id.clone(),
                target_agent_id: agent_id.to_owned(),
            });
        }

        if !agent.send(ServerMessage::CommandForwarded { command_id: command_id.clone(), payload }) {
            self.pending.take(&command_id);
            return Err(fail(HubError::AgentNotFound, Some(command_id)));
        }

        tracing::debug!(
            command_id = %command_id,
            agent_id,
            operator_id = operator_id.unwrap_or("-"),
            "command dispatched"
        );
        Ok(command_id)
    }

    /// Route an agent's result to the operator awaiting it. At most once per id.
    pub fn resolve_result(
        &self,
        command_id: &str,
        result: serde_json::Value,
        error: Option<serde_json::Value>,
    ) -> Delivery {
        let Some(pending) = self.pending.take(command_id) else {
            tracing::debug!(command_id, "result for unknown command dropped");
            return Delivery::Unknown;
        };

        let delivered = self.registry.lookup(&pending.operator_id, Role::Operator).is_some_and(|op| {
            op.send(ServerMessage::CommandResponse {
                command_id: pending.command_id.clone(),
                target_agent_id: pending.agent_id.clone(),
                result,
                error,
            })
        });

        if delivered {
            Delivery::Delivered
        } else {
            tracing::debug!(
                command_id,
                operator_id = %pending.operator_id,
                "operator gone, result orphaned"
            );
            Delivery::Orphaned
        }
    }

    /// Push an externally-originated event to every operator.
    pub fn broadcast(&self, event: &str, payload: serde_json::Value) -> FanoutReport {
        self.registry.broadcast(&ServerMessage::Notification { event: event.to_owned(), payload })
    }

    /// Drop commands pending longer than `ttl`, telling their operators.
    pub fn expire_pending(&self, ttl: Duration) -> usize {
        let expired = self.pending.expire(ttl, Instant::now());
        for p in &expired {
            if let Some(op) = self.registry.lookup(&p.operator_id, Role::Operator) {
                op.send(ServerMessage::CommandFailed {
                    reason: "command expired".to_owned(),
                    target_agent_id: p.agent_id.clone(),
                    command_id: Some(p.command_id.clone()),
                });
            }
            tracing::info!(command_id = %p.command_id, agent_id = %p.agent_id, "pending command expired");
        }
        expired.len()
    }
}

/// Spawn the pending-command expiry sweep if a TTL is configured.
pub fn spawn_pending_sweeper(state: Arc<AppState>) {
    let Some(ttl) = state.config.pending_ttl() else {
        return;
    };
    let interval = state.config.sweep_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            state.relay.expire_pending(ttl);
        }
    });
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
