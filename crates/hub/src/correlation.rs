// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlation table for in-flight commands.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::protocol::{CommandId, ConnectionId};

/// What a command id is minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Operator-issued command.
    Command,
    /// Upload instruction sent on behalf of an HTTP caller.
    Upload,
}

impl CommandKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Command => "cmd",
            Self::Upload => "upload",
        }
    }
}

/// Mint a fresh command id for `kind`.
pub fn mint_command_id(kind: CommandKind) -> CommandId {
    format!("{}_{}", kind.prefix(), uuid::Uuid::new_v4().simple())
}

/// One command awaiting its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub command_id: CommandId,
    pub operator_id: ConnectionId,
    pub agent_id: ConnectionId,
    pub created_at: Instant,
}

/// Map of live command ids to the operator awaiting each result.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<CommandId, PendingCommand>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command from `operator_id` to `agent_id` under a fresh id.
    pub fn insert(&self, kind: CommandKind, operator_id: &str, agent_id: &str) -> CommandId {
        self.insert_with(|| mint_command_id(kind), operator_id, agent_id)
    }

    /// Like [`insert`](Self::insert) with a caller-supplied id source.
    ///
    /// Ids that collide with a live entry are discarded and `mint` is called
    /// again, so an id is never shared by two pending commands.
    pub fn insert_with(
        &self,
        mut mint: impl FnMut() -> CommandId,
        operator_id: &str,
        agent_id: &str,
    ) -> CommandId {
        let mut entries = self.entries.lock();
        loop {
            let command_id = mint();
            if let Entry::Vacant(slot) = entries.entry(command_id.clone()) {
                slot.insert(PendingCommand {
                    command_id: command_id.clone(),
                    operator_id: operator_id.to_owned(),
                    agent_id: agent_id.to_owned(),
                    created_at: Instant::now(),
                });
                return command_id;
            }
            tracing::debug!(command_id = %command_id, "command id collision, minting another");
        }
    }

    /// Remove and return the entry for `command_id`.
    pub fn take(&self, command_id: &str) -> Option<PendingCommand> {
        self.entries.lock().remove(command_id)
    }

    /// Drop every entry owned by `operator_id`. Returns the number removed.
    pub fn discard_operator(&self, operator_id: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, p| p.operator_id != operator_id);
        before - entries.len()
    }

    /// Remove and return entries older than `ttl` as of `now`.
    pub fn expire(&self, ttl: Duration, now: Instant) -> Vec<PendingCommand> {
        let mut entries = self.entries.lock();
        let stale: Vec<CommandId> = entries
            .values()
            .filter(|p| now.saturating_duration_since(p.created_at) >= ttl)
            .map(|p| p.command_id.clone())
            .collect();
        stale.iter().filter_map(|id| entries.remove(id)).collect()
    }

    pub fn contains(&self, command_id: &str) -> bool {
        self.entries.lock().contains_key(command_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "correlation_tests.rs"]
mod tests;
