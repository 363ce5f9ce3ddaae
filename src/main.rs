use anyhow::Context;
use bittorrent::client::Client;
use bittorrent::metainfo::parse_metainfo;
use bittorrent::nat::NoopNat;
use bittorrent::storage::MemoryStorage;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
struct Args {
    /// Path to a `.torrent` file to load and start downloading.
    torrent: PathBuf,

    /// TCP port to listen on for inbound peer connections (0 = ephemeral).
    #[arg(long, default_value_t = 0)]
    port: u16,

    /// 8-byte client identifier prefix, padded with 12 random bytes.
    #[arg(long, default_value = "-RT0001-")]
    peer_id_prefix: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let bytes = tokio::fs::read(&args.torrent)
        .await
        .with_context(|| format!("reading {}", args.torrent.display()))?;
    let metainfo = parse_metainfo(&bytes).context("parsing torrent metainfo")?;

    let client = Arc::new(
        Client::bind(args.port, args.peer_id_prefix.as_bytes(), Box::new(NoopNat))
            .await
            .context("binding listening socket")?,
    );
    client.map_port().await;

    let storage = Arc::new(MemoryStorage::new(metainfo.info.total_length()));
    let torrent = client.add_torrent(&metainfo, storage);
    tracing::info!(
        name = %metainfo.info.name,
        info_hash = %hex::encode(metainfo.info_hash),
        port = client.local_port()?,
        "torrent added"
    );

    tokio::select! {
        result = client.run_accept_loop() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            torrent.shutdown();
        }
    }
    Ok(())
}
