//! Connection management and wire framing.
//!
//! A [`Connection`] owns one socket, its reader/writer pumps, and a
//! [`PacketFramer`] that turns the byte stream into length-prefixed,
//! ID-tagged frames. [`connect`] and [`bind`] are the socket-establishment
//! helpers used by the client and server state machines.

pub use connection::{Connection, PacketReceiver};
pub use framer::{PacketFramer, ID_BYTES, LENGTH_BYTES};

mod connection;
mod framer;

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::error;

use crate::service::{AppConfig, AppError, AppResult};

/// Per-connection knobs carried from configuration into `Connection::open`.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub max_frame_size: usize,
    pub flush_interval: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            max_frame_size: 4 * 1024 * 1024,
            flush_interval: Duration::from_millis(2),
        }
    }
}

impl ConnectionSettings {
    pub fn from_config(config: &AppConfig) -> ConnectionSettings {
        ConnectionSettings {
            max_frame_size: config.network.max_frame_size,
            flush_interval: Duration::from_millis(config.timing.flush_interval_ms),
        }
    }
}

/// Opens an outbound socket with NODELAY set.
pub async fn connect(host: &str, port: u16) -> AppResult<TcpStream> {
    let stream = TcpStream::connect((host, port)).await.map_err(|e| {
        error!("failed to connect to {}:{}: {}", host, port, e);
        AppError::Connect(format!("failed to connect to {}:{}: {}", host, port, e))
    })?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Binds the listening socket for a server.
pub async fn bind(host: &str, port: u16) -> AppResult<TcpListener> {
    TcpListener::bind((host, port)).await.map_err(|e| {
        error!("failed to bind {}:{}: {}", host, port, e);
        AppError::Accept(format!("failed to bind {}:{}: {}", host, port, e))
    })
}
