// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound connection handles and broadcast fanout to operators.

use tokio::sync::mpsc;

use crate::protocol::{ConnectionId, ServerMessage};

/// Frames a connection may have queued before further sends to it fail.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Sending half of one connection's outbound queue.
///
/// The transport task owning the socket drains the receiving half; once that
/// task exits, every send through the handle fails. A peer that stops
/// reading fills its queue, after which sends to it fail too.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the transport drains.
    pub fn channel() -> (Self, mpsc::Receiver<ServerMessage>) {
        Self::with_capacity(OUTBOUND_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a message without waiting. Returns false if the connection is
    /// gone or its queue is full.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(event = msg.kind(), "outbound queue full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Push `msg` to every recipient. A failed recipient is logged and skipped.
pub fn broadcast<'a, I>(recipients: I, msg: &ServerMessage) -> FanoutReport
where
    I: IntoIterator<Item = (&'a ConnectionId, &'a ConnectionHandle)>,
{
    let mut report = FanoutReport::default();
    for (id, handle) in recipients {
        if handle.send(msg.clone()) {
            report.delivered += 1;
        } else {
            report.failed += 1;
            tracing::debug!(operator_id = %id, event = msg.kind(), "fanout delivery failed");
        }
    }
    report
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
