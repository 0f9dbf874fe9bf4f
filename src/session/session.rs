// Copyright 2025 The Framelink Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use tracing::{info, warn};

use crate::client::Client;
use crate::codec::PayloadReader;
use crate::packet::PacketId;
use crate::session::{DispatchTable, SessionId};
use crate::util::{ErrorChain, ErrorEntry};

/// Application behavior of a session.
///
/// Hooks run while the owning client holds the session borrowed: a hook may
/// freely send packets, inspect client state, or disconnect the client, but
/// must not call back into session-inspecting methods of the client
/// (`has_session`, `session_id`).
pub trait SessionHooks: Send {
    /// Called exactly once at session construction to populate the
    /// dispatch table.
    fn register_packets(&mut self, table: &mut DispatchTable);

    /// Called every owner tick while the client is connected.
    fn on_tick(&mut self, _client: &Client) {}

    /// Called exactly once when the client's connection ends, with whether
    /// this end initiated the disconnect.
    fn on_disconnected(&mut self, _client: &Client, _self_initiated: bool) {}
}

/// Builds the session for a client: the server calls it with a freshly
/// generated [`SessionId`] at accept time, the client side with the ID the
/// server sent.
pub type SessionFactory = Arc<dyn Fn(SessionId) -> Session + Send + Sync>;

/// Per-connection application state: identity, tick counter, packet
/// dispatch table, and diagnostics. Owned by exactly one client.
pub struct Session {
    id: SessionId,
    ticks: u64,
    table: DispatchTable,
    errors: ErrorChain,
    hooks: Box<dyn SessionHooks>,
}

impl Session {
    pub fn new(id: SessionId, mut hooks: Box<dyn SessionHooks>) -> Session {
        let mut table = DispatchTable::new();
        hooks.register_packets(&mut table);
        Session {
            id,
            ticks: 0,
            table,
            errors: ErrorChain::new(),
            hooks,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// How many ticks the owning client has forwarded.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn errors(&self) -> &ErrorChain {
        &self.errors
    }

    pub fn is_registered(&self, id: PacketId) -> bool {
        self.table.is_registered(id)
    }

    pub(crate) fn tick(&mut self, client: &Client) {
        self.hooks.on_tick(client);
        self.ticks += 1;
    }

    pub(crate) fn disconnected(&mut self, client: &Client, self_initiated: bool) {
        info!(
            "session {} disconnected (self initiated: {})",
            self.id, self_initiated
        );
        self.hooks.on_disconnected(client, self_initiated);
    }

    /// Routes one received frame through the dispatch table. A payload that
    /// fails to decode disconnects the client; an unregistered ID is merely
    /// dropped.
    pub(crate) fn receive(&mut self, client: &Client, id: PacketId, reader: &mut PayloadReader<'_>) {
        match self.table.dispatch(client, id, reader) {
            Ok(_) => {}
            Err(err) => {
                warn!(
                    "session {} failed to read packet {}, disconnecting: {}",
                    self.id, id, err
                );
                self.errors.record(ErrorEntry::from_error(err, "session"));
                client.disconnect();
            }
        }
    }
}
