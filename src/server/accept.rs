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

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::network::Connection;
use crate::packet::{SessionAcceptPacket, SessionRejectPacket};
use crate::policy::{PolicyContext, PolicyOutcome};
use crate::server::Server;
use crate::service::{AppError, CloseSignal};
use crate::util::ErrorEntry;

/// The blocking accept loop of a hosting server.
///
/// Each accepted socket is handed to its own task so a slow acceptance
/// policy never stalls the loop for other connections. An accept failure
/// fires the accept-failed callback and ends the loop, unless the listener
/// is being closed intentionally.
pub(crate) async fn accept_loop(server: Server, listener: tokio::net::TcpListener) {
    let mut shutdown = CloseSignal::new(server.inner.notify_shutdown.subscribe());
    info!(
        "accepting connections on {}",
        server
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "<unknown>".to_string())
    );

    loop {
        // a permit bounds the number of live connections; held until the
        // promoted client disconnects
        let permit = tokio::select! {
            permit = server.inner.limit_connections.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown.recv() => break,
        };

        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.recv() => break,
        };

        match accepted {
            Ok((socket, addr)) => {
                debug!("accepted socket from {}", addr);
                let promote = server.clone();
                tokio::spawn(async move {
                    handle_accepted(promote, socket, addr).await;
                    drop(permit);
                });
            }
            Err(err) => {
                if server.is_closing() {
                    info!("accept loop exiting: listener closed intentionally");
                } else {
                    error!("failed to accept client socket: {}", err);
                    server
                        .errors()
                        .record(ErrorEntry::from_error(AppError::Io(err), "accept loop"));
                    fire_accept_failed(&server);
                }
                break;
            }
        }
    }

    server.mark_accept_ended();
    debug!("accept loop finished");
}

/// Configures the socket, runs the acceptance policy against the raw
/// connection, and promotes it to an active client on success.
async fn handle_accepted(server: Server, socket: TcpStream, addr: SocketAddr) {
    if let Err(err) = socket.set_nodelay(true) {
        warn!("failed to set NODELAY on socket from {}: {}", addr, err);
    }
    let connection = Connection::open(socket, Some(addr), server.inner.opts.settings);
    info!(
        "connection {} from {} accepted, running policy enforcement",
        connection.id(),
        addr
    );

    // keep frames flowing to the policy's receiver while it deliberates
    let (stop_pump, _) = broadcast::channel::<()>(1);
    {
        let connection = connection.clone();
        let mut stop = CloseSignal::new(stop_pump.subscribe());
        let interval = server.inner.opts.tick_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = time::sleep(interval) => {}
                    _ = stop.recv() => break,
                }
                if connection.is_closed() {
                    break;
                }
                connection.process();
            }
        });
    }

    let policy = (server.inner.policy_factory)();
    let ctx = PolicyContext {
        connection: connection.clone(),
        stock: server.inner.stock.clone(),
    };
    let outcome = match time::timeout(server.inner.opts.policy_window, policy.enforce(&ctx)).await
    {
        Ok(outcome) => outcome,
        Err(_) => PolicyOutcome::Failure("ran out of time".to_string()),
    };
    let _ = stop_pump.send(());

    if connection.is_closed() {
        info!(
            "connection {} closed during policy enforcement, dropping",
            connection.id()
        );
        return;
    }

    match outcome {
        PolicyOutcome::Success => {
            let session = (server.inner.session_factory)(server.inner.session_ids.next());
            let session_id = session.id().clone();
            let client = Client::adopt(
                connection,
                session,
                server.inner.stock.clone(),
                server.inner.session_factory.clone(),
                server.inner.opts.tick_interval,
            );

            let accept = SessionAcceptPacket::new(
                server.inner.stock.session_accept,
                session_id.data(),
            );
            if !client.send(&accept) {
                warn!(
                    "failed to send session acceptance to client {}, disconnecting",
                    client.id()
                );
                client.disconnect();
                return;
            }

            info!("client {} promoted with session {}", client.id(), session_id);
            if let Some(callback) = server.inner.on_accepted.lock().as_ref() {
                callback(&client);
            }
            server.inner.clients.insert(client.id(), client.clone());

            // hold this connection's permit until the client is gone
            let monitor_interval = server.inner.opts.tick_interval;
            loop {
                time::sleep(monitor_interval).await;
                if !client.is_connected() {
                    break;
                }
            }
        }
        PolicyOutcome::Failure(reason) => {
            info!(
                "connection {} failed acceptance policy: {}",
                connection.id(),
                reason
            );
            let reject =
                SessionRejectPacket::new(server.inner.stock.session_reject, reason);
            connection.send(&reject);
            // the writer flushes the rejection before the half-close lands
            connection.disconnect();
        }
    }
}

fn fire_accept_failed(server: &Server) {
    if let Some(callback) = server.inner.on_accept_failed.lock().as_ref() {
        callback();
    }
}
