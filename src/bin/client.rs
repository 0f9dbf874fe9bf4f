use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::info;

use framelink::{
    AppResult, Client, ClientOptions, ClientState, DispatchTable, MessagePacket, PacketIds,
    PingPacket, PongPacket, Session, SessionFactory, SessionHooks, StockPackets,
};

#[derive(Parser)]
#[command(version, about = "Framelink demo client")]
pub struct CommandLine {
    /// server host
    #[arg(long, default_value = "localhost")]
    pub host: String,
    /// server port
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,
    /// message to send once the session is established
    #[arg(short, long, default_value = "hello from framelink")]
    pub message: String,
}

/// Prints the echoed message and pong latency, then disconnects.
struct DemoHooks {
    stock: Arc<StockPackets>,
}

impl SessionHooks for DemoHooks {
    fn register_packets(&mut self, table: &mut DispatchTable) {
        let stock = *self.stock;
        table.register(
            stock.message,
            move || MessagePacket::empty(stock.message),
            move |client: &Client, _id, packet: MessagePacket| {
                info!("server echoed: {}", packet.message);
                client.disconnect();
            },
        );
        table.register(
            stock.pong,
            move || PongPacket::empty(stock.pong),
            move |_client: &Client, _id, packet: PongPacket| {
                let rtt = Utc::now().timestamp_millis() - packet.sent_at;
                info!("pong received, round trip {} ms", rtt);
            },
        );
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    framelink::setup_local_tracing()?;
    let commandline: CommandLine = CommandLine::parse();

    let ids = PacketIds::new();
    let stock = Arc::new(StockPackets::register(&ids));
    let session_stock = stock.clone();
    let session_factory: SessionFactory = Arc::new(move |session_id| {
        Session::new(
            session_id,
            Box::new(DemoHooks {
                stock: session_stock.clone(),
            }),
        )
    });

    let client = Client::connect(
        ClientOptions::new(commandline.host, commandline.port),
        stock.clone(),
        session_factory,
    );

    let mut sent = false;
    loop {
        tokio::time::sleep(Duration::from_millis(10)).await;
        match client.state() {
            ClientState::FailedToConnect => {
                match client.top_error() {
                    Some(error) => eprintln!("failed to connect: {}", error),
                    None => eprintln!("failed to connect"),
                }
                std::process::exit(1);
            }
            ClientState::Connected if client.has_session() && !sent => {
                info!("session {:?} established", client.session_id());
                client.send(&PingPacket::new(
                    stock.ping,
                    Utc::now().timestamp_millis(),
                ));
                client.send(&MessagePacket::new(stock.message, commandline.message.clone()));
                sent = true;
            }
            state if state.is_disconnected() => {
                info!("client finished ({:?})", state);
                break;
            }
            _ => {}
        }
    }
    Ok(())
}
