pub mod common;
pub mod http;
pub mod udp;

pub use common::{AnnounceEvent, AnnounceInfo, AnnounceResponse, PeerRecord, ScrapeStats};

use crate::error::Error;
use std::collections::BTreeMap;

pub async fn announce(url: &str, info: &AnnounceInfo) -> Result<AnnounceResponse, Error> {
    if let Some(rest) = url.strip_prefix("udp://") {
        let host = rest.split('/').next().unwrap_or(rest);
        let mut client = udp::UdpTrackerClient::connect(host).await?;
        return client.announce(info).await;
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        let client = reqwest::Client::new();
        return http::announce(&client, url, info).await;
    }
    Err(Error::TrackerUnsupportedScheme(url.to_owned()))
}

pub async fn scrape(url: &str, info_hashes: &[[u8; 20]]) -> Result<BTreeMap<[u8; 20], ScrapeStats>, Error> {
    if let Some(rest) = url.strip_prefix("udp://") {
        let host = rest.split('/').next().unwrap_or(rest);
        let mut client = udp::UdpTrackerClient::connect(host).await?;
        return client.scrape(info_hashes).await;
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        let client = reqwest::Client::new();
        return http::scrape(&client, url, info_hashes).await;
    }
    Err(Error::TrackerUnsupportedScheme(url.to_owned()))
}
