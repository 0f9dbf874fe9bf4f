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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time;
use tracing::{debug, info, warn};

use crate::client::ClientState;
use crate::codec::PayloadReader;
use crate::network::{self, Connection, ConnectionSettings};
use crate::packet::{Packet, PacketId, SessionAcceptPacket, SessionRejectPacket, StockPackets};
use crate::service::{AppConfig, AppError};
use crate::session::{Session, SessionFactory, SessionId};
use crate::util::{ErrorChain, ErrorEntry};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Endpoint and timing knobs for an outbound client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub settings: ConnectionSettings,
    pub tick_interval: Duration,
}

impl ClientOptions {
    pub fn new(host: impl Into<String>, port: u16) -> ClientOptions {
        ClientOptions {
            host: host.into(),
            port,
            settings: ConnectionSettings::default(),
            tick_interval: Duration::from_millis(2),
        }
    }

    pub fn from_config(config: &AppConfig) -> ClientOptions {
        ClientOptions {
            host: config.network.host.clone(),
            port: config.network.port,
            settings: ConnectionSettings::from_config(config),
            tick_interval: Duration::from_millis(config.timing.tick_interval_ms),
        }
    }
}

struct ClientInner {
    id: u64,
    state: Mutex<ClientState>,
    connection: Mutex<Option<Arc<Connection>>>,
    session: Mutex<Option<Session>>,
    errors: ErrorChain,
    stock: Arc<StockPackets>,
    session_factory: SessionFactory,
    tick_interval: Duration,
}

/// One endpoint of a connection, either side of the wire.
///
/// A single type serves both roles: [`Client::connect`] builds the outbound
/// kind, [`Client::adopt`] wraps a server-accepted connection. The handle is
/// cheap to clone; a background tick loop drives frame processing and the
/// session for as long as the connection lives.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    fn new(
        stock: Arc<StockPackets>,
        session_factory: SessionFactory,
        tick_interval: Duration,
    ) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(ClientState::Init),
                connection: Mutex::new(None),
                session: Mutex::new(None),
                errors: ErrorChain::new(),
                stock,
                session_factory,
                tick_interval,
            }),
        }
    }

    /// Starts an outbound client: establishes the connection in the
    /// background, then runs the tick loop. A failed attempt parks the
    /// client in `FailedToConnect` with the cause queryable via
    /// [`Client::top_error`]. The session is installed when the server's
    /// session acceptance arrives.
    pub fn connect(
        options: ClientOptions,
        stock: Arc<StockPackets>,
        session_factory: SessionFactory,
    ) -> Client {
        let client = Client::new(stock, session_factory, options.tick_interval);
        let establish = client.clone();
        tokio::spawn(async move {
            info!(
                "client {} establishing connection to {}:{}",
                establish.id(),
                options.host,
                options.port
            );
            establish.set_state(ClientState::EstablishingConnection);
            match network::connect(&options.host, options.port).await {
                Ok(stream) => {
                    let peer = stream.peer_addr().ok();
                    let connection = Connection::open(stream, peer, options.settings);
                    establish.attach_connection(connection);
                    establish.run_loop().await;
                }
                Err(err) => {
                    info!(
                        "client {} failed to establish connection: {}",
                        establish.id(),
                        err
                    );
                    establish
                        .inner
                        .errors
                        .record(ErrorEntry::from_error(err, "client"));
                    establish.set_state(ClientState::FailedToConnect);
                }
            }
        });
        client
    }

    /// Wraps an already-established connection (the server's accept path),
    /// installing the session immediately and starting the tick loop.
    pub fn adopt(
        connection: Arc<Connection>,
        session: Session,
        stock: Arc<StockPackets>,
        session_factory: SessionFactory,
        tick_interval: Duration,
    ) -> Client {
        let client = Client::new(stock, session_factory, tick_interval);
        client.set_state(ClientState::EstablishingConnection);
        client.start_session(session);
        client.attach_connection(connection);
        let looper = client.clone();
        tokio::spawn(async move {
            looper.run_loop().await;
        });
        client
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> ClientState {
        *self.inner.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    pub fn did_disconnect(&self) -> bool {
        self.state().is_disconnected()
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.inner.connection.lock().clone()
    }

    pub fn errors(&self) -> &ErrorChain {
        &self.inner.errors
    }

    pub fn top_error(&self) -> Option<ErrorEntry> {
        self.inner.errors.top_error()
    }

    pub fn has_session(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.session.lock().as_ref().map(|s| s.id().clone())
    }

    /// Installs the session. A client owns at most one session for its
    /// entire life; a second call is a caller contract violation.
    pub fn start_session(&self, session: Session) {
        let mut slot = self.inner.session.lock();
        assert!(
            slot.is_none(),
            "session already started for client {}",
            self.inner.id
        );
        self.inner.errors.add_child(session.errors());
        *slot = Some(session);
    }

    /// Queues one packet on the connection. False when there is no live
    /// connection.
    pub fn send(&self, packet: &dyn Packet) -> bool {
        match self.connection() {
            Some(connection) => connection.send(packet),
            None => false,
        }
    }

    /// Intentionally disconnects: half-closes the outbound side so the peer
    /// sees an orderly end, and marks this client `DisconnectedSelf`. The
    /// session is notified from the tick loop.
    pub fn disconnect(&self) {
        let Some(connection) = self.connection() else {
            info!("client {} has no connection to disconnect", self.inner.id);
            return;
        };
        info!("client {} disconnecting", self.inner.id);
        if connection.disconnect() {
            self.transition_from_connected(ClientState::DisconnectedSelf);
        }
    }

    fn set_state(&self, next: ClientState) {
        let mut state = self.inner.state.lock();
        state.assert_transition(next);
        *state = next;
    }

    /// Leaves `Connected` for `next` only if nothing else got there first.
    fn transition_from_connected(&self, next: ClientState) -> bool {
        let mut state = self.inner.state.lock();
        if *state != ClientState::Connected {
            return false;
        }
        state.assert_transition(next);
        *state = next;
        true
    }

    fn attach_connection(&self, connection: Arc<Connection>) {
        self.inner.errors.add_child(connection.errors());
        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        connection.set_packet_receiver(Box::new(move |id, reader| {
            if let Some(inner) = weak.upgrade() {
                Client { inner }.receive_packet(id, reader);
            }
        }));
        *self.inner.connection.lock() = Some(connection);
        self.set_state(ClientState::Connected);
        info!("connection established for client {}", self.inner.id);
    }

    fn receive_packet(&self, id: PacketId, reader: &mut PayloadReader<'_>) {
        let mut session = self.inner.session.lock();
        match session.as_mut() {
            Some(active) => active.receive(self, id, reader),
            None => self.receive_before_session(&mut session, id, reader),
        }
    }

    /// Stock-packet handling for the window between `Connected` and the
    /// server's session verdict.
    fn receive_before_session(
        &self,
        slot: &mut Option<Session>,
        id: PacketId,
        reader: &mut PayloadReader<'_>,
    ) {
        let stock = &self.inner.stock;
        if id == stock.session_accept {
            let mut packet = SessionAcceptPacket::empty(id);
            match packet.read(reader) {
                Ok(()) => {
                    info!(
                        "client {} received session {} from server",
                        self.inner.id, packet.session_id
                    );
                    let session =
                        (self.inner.session_factory)(SessionId::adopt(packet.session_id));
                    self.inner.errors.add_child(session.errors());
                    *slot = Some(session);
                }
                Err(err) => {
                    warn!(
                        "client {} failed to read session acceptance, disconnecting: {}",
                        self.inner.id, err
                    );
                    self.inner
                        .errors
                        .record(ErrorEntry::from_error(err, "client"));
                    self.disconnect();
                }
            }
        } else if id == stock.session_reject {
            let mut packet = SessionRejectPacket::empty(id);
            let reason = match packet.read(reader) {
                Ok(()) => packet.reason,
                Err(_) => "unknown".to_string(),
            };
            warn!("client {} rejected by server: {}", self.inner.id, reason);
            self.inner
                .errors
                .record(ErrorEntry::from_error(AppError::Rejected(reason), "client"));
            self.disconnect();
        } else {
            debug!(
                "client {} dropping packet {} received before session establishment",
                self.inner.id, id
            );
        }
    }

    async fn run_loop(&self) {
        loop {
            time::sleep(self.inner.tick_interval).await;
            if !self.tick() {
                break;
            }
        }
        debug!("client {} tick loop exited", self.inner.id);
    }

    /// One owner tick. Returns false when the loop should end.
    fn tick(&self) -> bool {
        match self.state() {
            ClientState::Init | ClientState::EstablishingConnection => true,
            ClientState::FailedToConnect => {
                info!("client {} no longer connected", self.inner.id);
                false
            }
            ClientState::Connected => self.tick_connected(),
            ClientState::DisconnectedSelf => {
                // drain any final input that raced the disconnect
                if let Some(connection) = self.connection() {
                    connection.process();
                }
                self.notify_disconnected(true);
                false
            }
            ClientState::DisconnectedOrderly | ClientState::DisconnectedAbortive => {
                self.notify_disconnected(false);
                false
            }
        }
    }

    fn tick_connected(&self) -> bool {
        let Some(connection) = self.connection() else {
            return false;
        };
        if !connection.is_closed() {
            connection.process();
            if !connection.is_closed() {
                let mut session = self.inner.session.lock();
                if let Some(session) = session.as_mut() {
                    session.tick(self);
                }
            }
            return true;
        }

        // the connection reported closed: settle the close, classify, and
        // notify once
        connection.close();
        let (next, self_initiated) = if connection.did_disconnect_self() {
            (ClientState::DisconnectedSelf, true)
        } else if connection.reached_end() {
            (ClientState::DisconnectedOrderly, false)
        } else {
            (ClientState::DisconnectedAbortive, false)
        };
        if !self.transition_from_connected(next) {
            // another task transitioned first; settle on the next tick
            return true;
        }
        match next {
            ClientState::DisconnectedAbortive => match self.top_error() {
                Some(error) => info!(
                    "client {} disconnected abortively: {}",
                    self.inner.id, error
                ),
                None => info!(
                    "client {} disconnected abortively, no error to report",
                    self.inner.id
                ),
            },
            _ => {
                // safe disconnection: read any final input before closing out
                connection.process();
                info!("client {} disconnected ({:?})", self.inner.id, next);
            }
        }
        self.notify_disconnected(self_initiated);
        false
    }

    fn notify_disconnected(&self, self_initiated: bool) {
        let mut session = self.inner.session.lock();
        if let Some(session) = session.as_mut() {
            session.disconnected(self, self_initiated);
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}
