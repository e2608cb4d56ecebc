// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry: live agent and operator connections.
//!
//! Agents and operators live in two independent maps behind one lock, so a
//! lookup sees a session either fully present or fully absent. Connect and
//! disconnect fanout happens while the lock is held, which keeps an
//! operator's registration snapshot and the event stream it receives
//! afterwards consistent with each other.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::fanout::{self, ConnectionHandle, FanoutReport};
use crate::protocol::{AgentInfo, ConnectionId, Role, ServerMessage};

/// A registered agent connection.
#[derive(Debug, Clone)]
pub struct AgentSession {
    pub id: ConnectionId,
    pub metadata: serde_json::Value,
    pub handle: ConnectionHandle,
    seq: u64,
}

impl AgentSession {
    pub fn info(&self) -> AgentInfo {
        AgentInfo { id: self.id.clone(), metadata: self.metadata.clone() }
    }
}

#[derive(Debug, Default)]
struct Sessions {
    agents: HashMap<ConnectionId, AgentSession>,
    operators: HashMap<ConnectionId, ConnectionHandle>,
    next_seq: u64,
}

impl Sessions {
    fn agent_snapshot(&self) -> Vec<AgentInfo> {
        let mut agents: Vec<&AgentSession> = self.agents.values().collect();
        agents.sort_by_key(|a| a.seq);
        agents.into_iter().map(AgentSession::info).collect()
    }
}

/// What [`Registry::unregister`] removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unregistered {
    /// Last-known agent info, if the id was an agent.
    pub agent: Option<AgentInfo>,
    /// Whether the id was an operator.
    pub operator: bool,
}

impl Unregistered {
    pub fn is_empty(&self) -> bool {
        self.agent.is_none() && !self.operator
    }
}

/// Registry of live agent and operator sessions.
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<Sessions>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an agent and announce it to every operator.
    pub fn register_agent(
        &self,
        id: ConnectionId,
        metadata: serde_json::Value,
        handle: ConnectionHandle,
    ) -> FanoutReport {
        let mut s = self.inner.write();
        let seq = match s.agents.get(&id) {
            Some(existing) => existing.seq,
            None => {
                s.next_seq += 1;
                s.next_seq
            }
        };
        s.agents
            .insert(id.clone(), AgentSession { id: id.clone(), metadata: metadata.clone(), handle, seq });
        fanout::broadcast(&s.operators, &ServerMessage::AgentConnected { id, metadata })
    }

    /// Insert an operator and return the agents registered at that instant.
    ///
    /// The same snapshot is queued on `handle` as an `agent-list` frame before
    /// the lock is released, so no connect/disconnect event can reach the
    /// operator ahead of it.
    pub fn register_operator(&self, id: ConnectionId, handle: ConnectionHandle) -> Vec<AgentInfo> {
        let mut s = self.inner.write();
        let agents = s.agent_snapshot();
        handle.send(ServerMessage::AgentList { agents: agents.clone() });
        s.operators.insert(id, handle);
        agents
    }

    /// Remove `id` from both collections. A removed agent is announced to the
    /// remaining operators with its last-known metadata.
    pub fn unregister(&self, id: &str) -> Unregistered {
        let mut s = self.inner.write();
        let operator = s.operators.remove(id).is_some();
        let agent = s.agents.remove(id).map(|a| a.info());
        if let Some(ref info) = agent {
            fanout::broadcast(
                &s.operators,
                &ServerMessage::AgentDisconnected { id: info.id.clone(), metadata: info.metadata.clone() },
            );
        }
        Unregistered { agent, operator }
    }

    /// Connection handle for `id` in the collection named by `role`.
    pub fn lookup(&self, id: &str, role: Role) -> Option<ConnectionHandle> {
        let s = self.inner.read();
        match role {
            Role::Agent => s.agents.get(id).map(|a| a.handle.clone()),
            Role::Operator => s.operators.get(id).cloned(),
        }
    }

    pub fn agent(&self, id: &str) -> Option<AgentInfo> {
        self.inner.read().agents.get(id).map(AgentSession::info)
    }

    /// All agents in registration order.
    pub fn agents(&self) -> Vec<AgentInfo> {
        self.inner.read().agent_snapshot()
    }

    pub fn agent_count(&self) -> usize {
        self.inner.read().agents.len()
    }

    pub fn operator_count(&self) -> usize {
        self.inner.read().operators.len()
    }

    /// Push `msg` to every registered operator.
    pub fn broadcast(&self, msg: &ServerMessage) -> FanoutReport {
        let s = self.inner.read();
        fanout::broadcast(&s.operators, msg)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
