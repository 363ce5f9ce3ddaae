use crate::error::ErrResp;
use crate::request::{AnnounceOutcome, AnnounceQuery, TrackerRequest};
use crate::state::AppState;
use axum::extract::{ConnectInfo, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use bittorrent::bencode::{encode, Value};
use bittorrent::peer_id::PeerId;
use bittorrent::tracker_client::common::encode_compact_peers;
use bittorrent::tracker_client::{AnnounceEvent, PeerRecord, ScrapeStats};
use bittorrent::util::decode_binary;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::oneshot;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/announce", get(announce))
        .route("/scrape", get(scrape))
        .with_state(state)
}

struct RawAnnounce {
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    ip: Option<IpAddr>,
    port: u16,
    uploaded: u64,
    downloaded: u64,
    left: u64,
    event: AnnounceEvent,
    num_want: Option<u32>,
    compact: bool,
}

fn parse_announce_query(query: &str) -> Result<RawAnnounce, String> {
    let mut info_hash: Option<[u8; 20]> = None;
    let mut peer_id: Option<[u8; 20]> = None;
    let mut ip: Option<IpAddr> = None;
    let mut port: Option<u16> = None;
    let mut uploaded = 0u64;
    let mut downloaded = 0u64;
    let mut left = 0u64;
    let mut event = AnnounceEvent::Empty;
    let mut num_want: Option<u32> = None;
    let mut compact = false;

    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        match key {
            "info_hash" => {
                info_hash = Some(
                    decode_binary(value)
                        .map_err(|e| e.to_string())?
                        .try_into()
                        .map_err(|_| "info_hash must be 20 bytes".to_string())?,
                )
            }
            "peer_id" => {
                peer_id = Some(
                    decode_binary(value)
                        .map_err(|e| e.to_string())?
                        .try_into()
                        .map_err(|_| "peer_id must be 20 bytes".to_string())?,
                )
            }
            "ip" => ip = value.parse().ok(),
            "port" => port = Some(value.parse().map_err(|_| "invalid port")?),
            "uploaded" => uploaded = value.parse().map_err(|_| "invalid uploaded")?,
            "downloaded" => downloaded = value.parse().map_err(|_| "invalid downloaded")?,
            "left" => left = value.parse().map_err(|_| "invalid left")?,
            "event" => {
                event = match value {
                    "started" => AnnounceEvent::Started,
                    "stopped" => AnnounceEvent::Stopped,
                    "completed" => AnnounceEvent::Completed,
                    "" | "empty" => AnnounceEvent::Empty,
                    other => return Err(format!("unknown event {other:?}")),
                }
            }
            "numwant" => num_want = value.parse().ok(),
            "compact" => compact = value == "1",
            // `key` is accepted and byte-decoded for shape validity but this
            // tracker doesn't correlate re-announces by it.
            "key" => {
                decode_binary(value).map_err(|e| e.to_string())?;
            }
            _ => {}
        }
    }

    Ok(RawAnnounce {
        info_hash: info_hash.ok_or("missing info_hash")?,
        peer_id: peer_id.ok_or("missing peer_id")?,
        ip,
        port: port.ok_or("missing port")?,
        uploaded,
        downloaded,
        left,
        event,
        num_want,
        compact,
    })
}

fn client_ip(headers: &HeaderMap, query_ip: Option<IpAddr>, socket_ip: IpAddr) -> IpAddr {
    if let Some(ip) = query_ip {
        return ip;
    }
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next().and_then(|s| s.trim().parse().ok()) {
            return first;
        }
    }
    socket_ip
}

async fn announce(
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Vec<u8>), ErrResp> {
    let query = query.ok_or_else(|| ErrResp::bad_request("missing query string"))?;
    let parsed = parse_announce_query(&query).map_err(ErrResp::bad_request)?;
    let peer_ip = client_ip(&headers, parsed.ip, addr.ip());
    let peer_addr = SocketAddr::new(peer_ip, parsed.port);

    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .requests
        .send(TrackerRequest::Announce {
            query: AnnounceQuery {
                info_hash: parsed.info_hash,
                peer_id: parsed.peer_id,
                peer_addr,
                uploaded: parsed.uploaded,
                downloaded: parsed.downloaded,
                left: parsed.left,
                event: parsed.event,
                num_want: parsed.num_want,
            },
            reply: reply_tx,
        })
        .await
        .map_err(|_| ErrResp::server_error("tracker is shutting down"))?;
    let outcome = reply_rx
        .await
        .map_err(|_| ErrResp::server_error("tracker dropped the reply"))?
        .map_err(ErrResp::bad_request)?;

    Ok((StatusCode::OK, encode_announce_outcome(&outcome, parsed.compact)))
}

fn encode_announce_outcome(outcome: &AnnounceOutcome, compact: bool) -> Vec<u8> {
    let mut dict = BTreeMap::new();
    dict.insert(b"interval".to_vec(), Value::Int(i64::from(outcome.interval)));
    dict.insert(b"complete".to_vec(), Value::Int(i64::from(outcome.complete)));
    dict.insert(b"incomplete".to_vec(), Value::Int(i64::from(outcome.incomplete)));
    dict.insert(b"peers".to_vec(), encode_peers(&outcome.peers, compact));
    encode(&Value::Dict(dict))
}

fn encode_peers(peers: &[PeerRecord], compact: bool) -> Value {
    if compact {
        return Value::Bytes(encode_compact_peers(peers));
    }
    Value::List(
        peers
            .iter()
            .map(|peer| {
                let mut entry = BTreeMap::new();
                if let Some(peer_id) = peer.peer_id {
                    entry.insert(b"peer id".to_vec(), Value::Bytes(peer_id.into_bytes().to_vec()));
                }
                entry.insert(b"ip".to_vec(), Value::string(peer.addr.ip().to_string()));
                entry.insert(b"port".to_vec(), Value::Int(i64::from(peer.addr.port())));
                Value::Dict(entry)
            })
            .collect(),
    )
}

fn parse_scrape_query(query: &str) -> Result<Vec<[u8; 20]>, String> {
    let mut hashes = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        if parts.next() != Some("info_hash") {
            continue;
        }
        let value = parts.next().unwrap_or_default();
        let bytes: [u8; 20] = decode_binary(value)
            .map_err(|e| e.to_string())?
            .try_into()
            .map_err(|_| "info_hash must be 20 bytes".to_string())?;
        hashes.push(bytes);
    }
    Ok(hashes)
}

async fn scrape(RawQuery(query): RawQuery, State(state): State<AppState>) -> Result<(StatusCode, Vec<u8>), ErrResp> {
    let info_hashes = match query {
        Some(q) if !q.is_empty() => parse_scrape_query(&q).map_err(ErrResp::bad_request)?,
        _ => Vec::new(),
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .requests
        .send(TrackerRequest::Scrape { info_hashes, reply: reply_tx })
        .await
        .map_err(|_| ErrResp::server_error("tracker is shutting down"))?;
    let stats = reply_rx.await.map_err(|_| ErrResp::server_error("tracker dropped the reply"))?;

    Ok((StatusCode::OK, encode_scrape_outcome(&stats)))
}

fn encode_scrape_outcome(stats: &BTreeMap<[u8; 20], ScrapeStats>) -> Vec<u8> {
    let mut files = BTreeMap::new();
    for (hash, s) in stats {
        let mut entry = BTreeMap::new();
        entry.insert(b"complete".to_vec(), Value::Int(i64::from(s.complete)));
        entry.insert(b"downloaded".to_vec(), Value::Int(i64::from(s.downloaded)));
        entry.insert(b"incomplete".to_vec(), Value::Int(i64::from(s.incomplete)));
        files.insert(hash.to_vec(), Value::Dict(entry));
    }
    let mut top = BTreeMap::new();
    top.insert(b"files".to_vec(), Value::Dict(files));
    encode(&Value::Dict(top))
}
