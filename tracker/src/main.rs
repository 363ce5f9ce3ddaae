use clap::Parser;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracker::request::TrackerRequest;
use tracker::server::{http, udp};
use tracker::state::AppState;
use tracker::swarm::{run_consumer, SwarmTable};

#[derive(Debug, Parser)]
struct Args {
    /// Address the HTTP tracker (`/announce`, `/scrape`) listens on.
    #[arg(long, default_value = "0.0.0.0:8000")]
    http_bind: SocketAddr,

    /// Address the UDP tracker listens on.
    #[arg(long, default_value = "0.0.0.0:8000")]
    udp_bind: SocketAddr,

    /// Newline-separated 40-char hex info hashes; when given, only those
    /// torrents are served.
    #[arg(long)]
    filter_list: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let filter = match &args.filter_list {
        Some(path) => Some(load_filter_list(path).await?),
        None => None,
    };

    let (tx, rx) = mpsc::channel::<TrackerRequest>(1024);
    tokio::spawn(run_consumer(SwarmTable::new(filter), rx));
    let state = AppState { requests: tx };

    let udp_socket = UdpSocket::bind(args.udp_bind).await?;
    tracing::info!(bind = %args.udp_bind, "udp tracker listening");
    let udp_state = state.clone();
    tokio::spawn(async move { udp::run(udp_socket, udp_state).await });

    let listener = tokio::net::TcpListener::bind(args.http_bind).await?;
    tracing::info!(bind = %args.http_bind, "http tracker listening");
    axum::serve(listener, http::router(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn load_filter_list(path: &Path) -> anyhow::Result<HashSet<[u8; 20]>> {
    let text = tokio::fs::read_to_string(path).await?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let bytes = hex::decode(line.trim())?;
            let hash: [u8; 20] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("info hash must be 20 bytes: {line}"))?;
            Ok(hash)
        })
        .collect()
}
