use super::common::{decode_compact_peers, AnnounceInfo, AnnounceResponse, PeerRecord, ScrapeStats};
use crate::bencode::{self, Value};
use crate::error::Error;
use crate::peer_id::PeerId;
use crate::util::encode_binary;
use std::collections::BTreeMap;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn build_announce_url(base: &str, info: &AnnounceInfo) -> String {
    let mut url = format!(
        "{base}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&event={}&numwant={}&compact={}",
        encode_binary(&info.info_hash),
        encode_binary(info.peer_id.as_bytes()),
        info.port,
        info.uploaded,
        info.downloaded,
        info.left,
        info.event.as_str(),
        info.num_want,
        if info.compact { 1 } else { 0 },
    );
    if !info.key.is_empty() {
        url.push_str(&format!("&key={}", encode_binary(&info.key)));
    }
    if let Some(ip) = info.ip {
        url.push_str(&format!("&ip={ip}"));
    }
    url
}

fn parse_peer_list(value: &Value) -> Result<Vec<PeerRecord>, Error> {
    match value {
        Value::Bytes(bytes) => decode_compact_peers(bytes),
        Value::List(items) => items
            .iter()
            .map(|item| {
                let ip = item.require("ip")?.as_str()?.parse().map_err(|_| {
                    Error::TrackerRejected("peer entry has an invalid ip".into())
                })?;
                let port = item.require("port")?.as_int()? as u16;
                let peer_id = item
                    .get("peer id")
                    .and_then(|v| v.as_bytes().ok())
                    .and_then(|b| <[u8; 20]>::try_from(b).ok())
                    .map(PeerId::new);
                Ok(PeerRecord {
                    addr: std::net::SocketAddrV4::new(ip, port),
                    peer_id,
                })
            })
            .collect(),
        other => Err(Error::TrackerRejected(format!(
            "peers field has unexpected shape: {other:?}"
        ))),
    }
}

fn parse_announce_response(value: &Value) -> Result<AnnounceResponse, Error> {
    if let Some(reason) = value.get("failure reason") {
        let reason = reason.as_str().unwrap_or("unknown failure").to_owned();
        return Err(Error::TrackerRejected(reason));
    }
    let complete = value.require("complete")?.as_int()? as u32;
    let incomplete = value.require("incomplete")?.as_int()? as u32;
    let interval = value.require("interval")?.as_int()? as u32;
    let peers = parse_peer_list(value.require("peers")?)?;
    Ok(AnnounceResponse { interval, complete, incomplete, peers })
}

pub async fn announce(client: &reqwest::Client, url: &str, info: &AnnounceInfo) -> Result<AnnounceResponse, Error> {
    let full_url = build_announce_url(url, info);
    let response = client
        .get(&full_url)
        .timeout(TIMEOUT)
        .header("Cache-Control", "no-store")
        .send()
        .await
        .map_err(|e| Error::TrackerRejected(format!("request failed: {e}")))?;
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::TrackerRejected(format!("failed to read body: {e}")))?;
    let value = bencode::decode(&body).map_err(|e| Error::TrackerRejected(e.to_string()))?;
    parse_announce_response(&value)
}

fn scrape_url(announce_url: &str) -> Result<String, Error> {
    let (base, last_segment) = announce_url
        .rsplit_once('/')
        .ok_or_else(|| Error::BadUrl("announce url has no path segment".into()))?;
    let (last_segment, suffix) = match last_segment.split_once('?') {
        Some((seg, query)) => (seg, Some(query)),
        None => (last_segment, None),
    };
    if !last_segment.starts_with("announce") {
        return Err(Error::BadUrl(
            "announce url's last path segment does not start with \"announce\"".into(),
        ));
    }
    let replaced = last_segment.replacen("announce", "scrape", 1);
    Ok(match suffix {
        Some(query) => format!("{base}/{replaced}?{query}"),
        None => format!("{base}/{replaced}"),
    })
}

pub async fn scrape(
    client: &reqwest::Client,
    announce_url: &str,
    info_hashes: &[[u8; 20]],
) -> Result<BTreeMap<[u8; 20], ScrapeStats>, Error> {
    let base = scrape_url(announce_url)?;
    let params: Vec<String> = info_hashes
        .iter()
        .map(|h| format!("info_hash={}", encode_binary(h)))
        .collect();
    let url = format!("{base}?{}", params.join("&"));
    let response = client
        .get(&url)
        .timeout(TIMEOUT)
        .send()
        .await
        .map_err(|e| Error::TrackerRejected(format!("request failed: {e}")))?;
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::TrackerRejected(format!("failed to read body: {e}")))?;
    let value = bencode::decode(&body).map_err(|e| Error::TrackerRejected(e.to_string()))?;
    let files = value.require("files")?.as_dict()?;
    let mut out = BTreeMap::new();
    for (key, stats) in files {
        let Ok(hash) = <[u8; 20]>::try_from(key.as_slice()) else {
            continue;
        };
        let complete = stats.require("complete")?.as_int()? as u32;
        let downloaded = stats.require("downloaded")?.as_int()? as u32;
        let incomplete = stats.require("incomplete")?.as_int()? as u32;
        out.insert(hash, ScrapeStats { complete, downloaded, incomplete });
    }
    Ok(out)
}
