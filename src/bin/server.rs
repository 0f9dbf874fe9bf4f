use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::info;

use framelink::{
    open_policy_factory, AppConfig, AppResult, Client, DispatchTable, MessagePacket, PacketIds,
    PingPacket, PongPacket, Server, ServerOptions, Session, SessionFactory, SessionHooks,
    StockPackets,
};

#[derive(Parser)]
#[command(version, about = "Framelink echo server")]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
}

/// Echoes message packets back and answers pings with pongs.
struct EchoHooks {
    stock: Arc<StockPackets>,
}

impl SessionHooks for EchoHooks {
    fn register_packets(&mut self, table: &mut DispatchTable) {
        let stock = *self.stock;
        table.register(
            stock.message,
            move || MessagePacket::empty(stock.message),
            move |client: &Client, _id, packet: MessagePacket| {
                info!("message from client {}: {}", client.id(), packet.message);
                client.send(&MessagePacket::new(stock.message, packet.message.clone()));
            },
        );
        table.register(
            stock.ping,
            move || PingPacket::empty(stock.ping),
            move |client: &Client, _id, packet: PingPacket| {
                client.send(&PongPacket::new(stock.pong, packet.sent_at));
            },
        );
    }

    fn on_disconnected(&mut self, client: &Client, self_initiated: bool) {
        info!(
            "client {} left (self initiated: {})",
            client.id(),
            self_initiated
        );
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let commandline: CommandLine = CommandLine::parse();
    let _log_guard = framelink::setup_file_tracing("logs", "framelink-server.log");

    let config = match commandline.conf {
        Some(path) => AppConfig::load(PathBuf::from(path))?,
        None => AppConfig::default(),
    };

    let ids = PacketIds::new();
    let stock = Arc::new(StockPackets::register(&ids));
    let session_stock = stock.clone();
    let session_factory: SessionFactory = Arc::new(move |session_id| {
        Session::new(
            session_id,
            Box::new(EchoHooks {
                stock: session_stock.clone(),
            }),
        )
    });

    let server = Server::host(
        ServerOptions::from_config(&config),
        stock,
        session_factory,
        open_policy_factory(),
    );

    info!("echo server starting at {}", Utc::now().to_rfc3339());
    tokio::signal::ctrl_c().await?;
    server.close();
    // give the tick loops a moment to observe the close
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    info!("echo server shut down");
    Ok(())
}
