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

use tracing::info;

use crate::client::Client;
use crate::codec::PayloadReader;
use crate::packet::{Packet, PacketId};
use crate::service::AppResult;

/// The erased form of one registration: construct via the factory, decode,
/// hand the typed packet to the handler.
type DispatchFn = Box<dyn FnMut(&Client, PacketId, &mut PayloadReader<'_>) -> AppResult<()> + Send>;

/// Per-packet-ID slot table: a sparse array, auto-extended on registration,
/// mapping ID to a (factory, handler) pair.
#[derive(Default)]
pub struct DispatchTable {
    slots: Vec<Option<DispatchFn>>,
}

impl DispatchTable {
    pub fn new() -> DispatchTable {
        DispatchTable { slots: Vec::new() }
    }

    /// Registers a packet type: `factory` produces an empty instance to
    /// decode into, `handler` consumes the decoded packet along with the
    /// owning client. Registering an ID twice replaces the earlier slot.
    pub fn register<P, F, H>(&mut self, id: PacketId, factory: F, mut handler: H)
    where
        P: Packet,
        F: Fn() -> P + Send + 'static,
        H: FnMut(&Client, PacketId, P) + Send + 'static,
    {
        while self.slots.len() <= id as usize {
            self.slots.push(None);
        }
        self.slots[id as usize] = Some(Box::new(move |client, id, reader| {
            let mut packet = factory();
            packet.read(reader)?;
            handler(client, id, packet);
            Ok(())
        }));
    }

    pub fn is_registered(&self, id: PacketId) -> bool {
        self.slots
            .get(id as usize)
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Runs the registration for `id`. An unregistered ID is logged and the
    /// frame dropped; that is not an error. `Ok(true)` means a handler ran.
    pub(crate) fn dispatch(
        &mut self,
        client: &Client,
        id: PacketId,
        reader: &mut PayloadReader<'_>,
    ) -> AppResult<bool> {
        let Some(run) = self.slots.get_mut(id as usize).and_then(|s| s.as_mut()) else {
            info!("received packet with no handler, dropping (packet id: {})", id);
            return Ok(false);
        };
        run(client, id, reader)?;
        Ok(true)
    }
}
