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

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Semaphore};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::client::{Client, ClientState};
use crate::network::{self, ConnectionSettings};
use crate::packet::StockPackets;
use crate::policy::PolicyFactory;
use crate::server::accept::accept_loop;
use crate::server::ServerState;
use crate::service::AppConfig;
use crate::session::{SessionFactory, SessionIds};
use crate::util::{ErrorChain, ErrorEntry};

/// Bind address and limits for a server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub settings: ConnectionSettings,
    pub tick_interval: Duration,
    pub policy_window: Duration,
}

impl ServerOptions {
    pub fn new(host: impl Into<String>, port: u16) -> ServerOptions {
        ServerOptions {
            host: host.into(),
            port,
            max_connections: 1024,
            settings: ConnectionSettings::default(),
            tick_interval: Duration::from_millis(2),
            policy_window: Duration::from_millis(1000),
        }
    }

    pub fn from_config(config: &AppConfig) -> ServerOptions {
        ServerOptions {
            host: config.network.host.clone(),
            port: config.network.port,
            max_connections: config.network.max_connections,
            settings: ConnectionSettings::from_config(config),
            tick_interval: Duration::from_millis(config.timing.tick_interval_ms),
            policy_window: Duration::from_millis(config.timing.policy_window_ms),
        }
    }
}

/// Called when an accepted connection passes the policy and becomes an
/// active client.
pub type AcceptedCallback = Box<dyn Fn(&Client) + Send + Sync>;
/// Called when accepting or constructing a connection fails.
pub type AcceptFailedCallback = Box<dyn Fn() + Send + Sync>;

pub(crate) struct ServerInner {
    pub(crate) opts: ServerOptions,
    state: Mutex<ServerState>,
    pub(crate) clients: DashMap<u64, Client>,
    errors: ErrorChain,
    /// Set by `close()` before the listener is torn down, and read before
    /// treating an accept failure as fatal.
    closing: AtomicBool,
    /// Set when the accept loop exits, intentionally or not.
    accept_ended: AtomicBool,
    pub(crate) notify_shutdown: broadcast::Sender<()>,
    local_addr: Mutex<Option<SocketAddr>>,
    pub(crate) session_ids: SessionIds,
    pub(crate) stock: Arc<StockPackets>,
    pub(crate) session_factory: SessionFactory,
    pub(crate) policy_factory: PolicyFactory,
    pub(crate) limit_connections: Arc<Semaphore>,
    pub(crate) on_accepted: Mutex<Option<AcceptedCallback>>,
    pub(crate) on_accept_failed: Mutex<Option<AcceptFailedCallback>>,
}

/// The hosting state machine: binds a listener, accepts and promotes
/// clients through the acceptance policy, and evicts dead clients from its
/// table every tick so their sessions are released promptly.
#[derive(Clone)]
pub struct Server {
    pub(crate) inner: Arc<ServerInner>,
}

impl Server {
    /// Starts hosting in the background and returns the handle. Binding
    /// failure parks the server in `FailedToHost` with the cause queryable
    /// via [`Server::top_error`].
    pub fn host(
        opts: ServerOptions,
        stock: Arc<StockPackets>,
        session_factory: SessionFactory,
        policy_factory: PolicyFactory,
    ) -> Server {
        let (notify_shutdown, _) = broadcast::channel(1);
        let max_connections = opts.max_connections;
        let server = Server {
            inner: Arc::new(ServerInner {
                opts,
                state: Mutex::new(ServerState::Init),
                clients: DashMap::new(),
                errors: ErrorChain::new(),
                closing: AtomicBool::new(false),
                accept_ended: AtomicBool::new(false),
                notify_shutdown,
                local_addr: Mutex::new(None),
                session_ids: SessionIds::new(),
                stock,
                session_factory,
                policy_factory,
                limit_connections: Arc::new(Semaphore::new(max_connections)),
                on_accepted: Mutex::new(None),
                on_accept_failed: Mutex::new(None),
            }),
        };

        let establish = server.clone();
        tokio::spawn(async move {
            let host = establish.inner.opts.host.clone();
            let port = establish.inner.opts.port;
            info!("hosting server on {}:{}", host, port);
            establish.set_state(ServerState::EstablishingHost);
            match network::bind(&host, port).await {
                Ok(listener) => {
                    *establish.inner.local_addr.lock() = listener.local_addr().ok();
                    establish.set_state(ServerState::Hosting);
                    tokio::spawn(accept_loop(establish.clone(), listener));
                    establish.run_loop().await;
                }
                Err(err) => {
                    error!("failed to establish host: {}", err);
                    establish
                        .inner
                        .errors
                        .record(ErrorEntry::from_error(err, "server"));
                    establish.set_state(ServerState::FailedToHost);
                }
            }
        });
        server
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.lock()
    }

    pub fn is_hosting(&self) -> bool {
        self.state() == ServerState::Hosting
    }

    /// The bound address, available once `Hosting`. Useful when hosting on
    /// port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    pub fn errors(&self) -> &ErrorChain {
        &self.inner.errors
    }

    pub fn top_error(&self) -> Option<crate::util::ErrorEntry> {
        self.inner.errors.top_error()
    }

    pub fn client(&self, id: u64) -> Option<Client> {
        self.inner.clients.get(&id).map(|entry| entry.value().clone())
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn set_on_accepted(&self, callback: AcceptedCallback) {
        *self.inner.on_accepted.lock() = Some(callback);
    }

    pub fn set_on_accept_failed(&self, callback: AcceptFailedCallback) {
        *self.inner.on_accept_failed.lock() = Some(callback);
    }

    /// Idempotent. Marks the shutdown as intentional and signals the accept
    /// loop; the tick loop then transitions to `HostEnded`.
    pub fn close(&self) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing server");
        let _ = self.inner.notify_shutdown.send(());
    }

    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_accept_ended(&self) {
        self.inner.accept_ended.store(true, Ordering::SeqCst);
    }

    fn set_state(&self, next: ServerState) {
        let mut state = self.inner.state.lock();
        state.assert_transition(next);
        *state = next;
    }

    async fn run_loop(&self) {
        loop {
            time::sleep(self.inner.opts.tick_interval).await;
            if !self.tick() {
                break;
            }
        }
        debug!("server tick loop exited");
    }

    fn tick(&self) -> bool {
        match self.state() {
            ServerState::Init | ServerState::EstablishingHost => true,
            ServerState::FailedToHost | ServerState::HostEnded => false,
            ServerState::Hosting => {
                if self.inner.accept_ended.load(Ordering::SeqCst) {
                    if self.is_closing() {
                        info!("server host ended");
                    } else {
                        warn!("server host ended unexpectedly");
                    }
                    self.set_state(ServerState::HostEnded);
                    return false;
                }
                self.evict_dead_clients();
                true
            }
        }
    }

    /// Drops clients that are no longer connected so the session object of
    /// a dead client is released promptly.
    fn evict_dead_clients(&self) {
        let mut dead = Vec::new();
        for entry in self.inner.clients.iter() {
            if !entry.value().is_connected() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            if let Some((_, client)) = self.inner.clients.remove(&id) {
                match client.state() {
                    ClientState::DisconnectedSelf => {
                        info!("successfully disconnected client {}", client.id())
                    }
                    ClientState::DisconnectedOrderly | ClientState::DisconnectedAbortive => {
                        info!(
                            "lost client connection {} ({:?})",
                            client.id(),
                            client.state()
                        )
                    }
                    other => warn!("client {} failed for unknown cause ({:?})", client.id(), other),
                }
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("clients", &self.client_count())
            .finish()
    }
}
