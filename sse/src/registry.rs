//! Registry of live connections.
//!
//! The registry only tracks handles; every connection keeps its own queue
//! and writer task, so nothing here can make one connection wait on
//! another. Fan-out is fire-and-forget per connection.

use std::sync::Arc;

use dashmap::DashMap;
use log::*;

use crate::connection::{ConnectionId, SseConnection};
use crate::frame::SseFrame;

/// Live-connection registry with O(1) register/unregister by id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, SseConnection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn register(&self, connection: SseConnection) {
        debug!("registered SSE connection {}", connection.id());
        self.connections.insert(connection.id().clone(), connection);
    }

    pub fn unregister(&self, connection_id: &ConnectionId) {
        if self.connections.remove(connection_id).is_some() {
            debug!("unregistered SSE connection {connection_id}");
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of the currently registered connections.
    pub fn connections(&self) -> Vec<SseConnection> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Queue `frame` on every open connection. Returns how many
    /// connections it was queued on; per-connection outcomes are not
    /// awaited (a dead connection resolves its own receipt and is
    /// unregistered by its handler).
    pub fn broadcast(&self, frame: &SseFrame) -> usize {
        let mut queued = 0;
        for entry in self.connections.iter() {
            let connection = entry.value();
            if !connection.is_open() {
                continue;
            }
            drop(connection.send_frame(frame.clone()));
            queued += 1;
        }
        queued
    }

    /// Close every registered connection (server shutdown).
    pub fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().close();
        }
    }
}
