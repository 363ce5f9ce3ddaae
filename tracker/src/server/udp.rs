use crate::request::{AnnounceQuery, TrackerRequest};
use crate::state::AppState;
use bittorrent::tracker_client::AnnounceEvent;
use bittorrent::util::{read_uint, write_uint};
use rand::RngCore;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

const MAGIC: u64 = 0x0000_0417_2710_1980;
const CONNECTION_ID_LIFETIME: Duration = Duration::from_secs(120);
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_SCRAPE: u32 = 2;
const ACTION_ERROR: u32 = 3;

pub async fn run(socket: UdpSocket, state: AppState) {
    let mut connection_ids: HashMap<u64, Instant> = HashMap::new();
    let mut sweep = tokio::time::interval(CONNECTION_ID_LIFETIME);
    let mut buf = [0u8; 2048];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let Ok((n, from)) = received else { continue };
                if let Some(reply) = handle_datagram(&buf[..n], from, &mut connection_ids, &state).await {
                    socket.send_to(&reply, from).await.ok();
                }
            }
            _ = sweep.tick() => {
                let now = Instant::now();
                connection_ids.retain(|_, expiry| *expiry > now);
            }
        }
    }
}

async fn handle_datagram(
    datagram: &[u8],
    from: SocketAddr,
    connection_ids: &mut HashMap<u64, Instant>,
    state: &AppState,
) -> Option<Vec<u8>> {
    if datagram.len() < 16 {
        return None;
    }
    let first8 = read_uint(datagram, 8, 0).ok()?;
    let action = read_uint(datagram, 4, 8).ok()? as u32;
    let transaction_id = read_uint(datagram, 4, 12).ok()? as u32;

    if first8 == MAGIC && action == ACTION_CONNECT {
        let connection_id = loop {
            let id = rand::rng().next_u64();
            if id != 0 && !connection_ids.contains_key(&id) {
                break id;
            }
        };
        connection_ids.insert(connection_id, Instant::now() + CONNECTION_ID_LIFETIME);
        let mut reply = vec![0u8; 16];
        write_uint(u64::from(ACTION_CONNECT), &mut reply, 4, 0).ok()?;
        write_uint(u64::from(transaction_id), &mut reply, 4, 4).ok()?;
        write_uint(connection_id, &mut reply, 8, 8).ok()?;
        return Some(reply);
    }

    let connection_id = first8;
    let now = Instant::now();
    let known = connection_ids.get(&connection_id).is_some_and(|expiry| *expiry > now);
    if !known {
        return None;
    }

    match action {
        ACTION_ANNOUNCE if datagram.len() >= 98 => handle_announce(datagram, from, transaction_id, state).await,
        ACTION_SCRAPE if datagram.len() >= 16 => handle_scrape(datagram, transaction_id, state).await,
        _ => Some(error_reply(transaction_id, "malformed request")),
    }
}

fn error_reply(transaction_id: u32, reason: &str) -> Vec<u8> {
    let mut reply = vec![0u8; 8 + reason.len()];
    write_uint(u64::from(ACTION_ERROR), &mut reply, 4, 0).unwrap();
    write_uint(u64::from(transaction_id), &mut reply, 4, 4).unwrap();
    reply[8..].copy_from_slice(reason.as_bytes());
    reply
}

async fn handle_announce(datagram: &[u8], from: SocketAddr, transaction_id: u32, state: &AppState) -> Option<Vec<u8>> {
    let info_hash: [u8; 20] = datagram[16..36].try_into().ok()?;
    let peer_id: [u8; 20] = datagram[36..56].try_into().ok()?;
    let downloaded = read_uint(datagram, 8, 56).ok()?;
    let left = read_uint(datagram, 8, 64).ok()?;
    let uploaded = read_uint(datagram, 8, 72).ok()?;
    let event = match read_uint(datagram, 4, 80).ok()? {
        1 => AnnounceEvent::Completed,
        2 => AnnounceEvent::Started,
        3 => AnnounceEvent::Stopped,
        _ => AnnounceEvent::Empty,
    };
    let announced_ip = read_uint(datagram, 4, 84).ok()? as u32;
    let num_want = read_uint(datagram, 4, 92).ok()? as u32;
    let port = read_uint(datagram, 2, 96).ok()? as u16;

    let peer_ip = if announced_ip == 0 { from.ip() } else { IpAddr::V4(Ipv4Addr::from(announced_ip)) };
    let peer_addr = SocketAddr::new(peer_ip, port);

    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .requests
        .send(TrackerRequest::Announce {
            query: AnnounceQuery {
                info_hash,
                peer_id,
                peer_addr,
                uploaded,
                downloaded,
                left,
                event,
                num_want: (num_want != u32::MAX).then_some(num_want),
            },
            reply: reply_tx,
        })
        .await
        .ok()?;
    let outcome = match reply_rx.await.ok()? {
        Ok(outcome) => outcome,
        Err(reason) => return Some(error_reply(transaction_id, &reason)),
    };

    let mut reply = vec![0u8; 20 + 6 * outcome.peers.len()];
    write_uint(u64::from(ACTION_ANNOUNCE), &mut reply, 4, 0).ok()?;
    write_uint(u64::from(transaction_id), &mut reply, 4, 4).ok()?;
    write_uint(u64::from(outcome.interval), &mut reply, 4, 8).ok()?;
    write_uint(u64::from(outcome.incomplete), &mut reply, 4, 12).ok()?;
    write_uint(u64::from(outcome.complete), &mut reply, 4, 16).ok()?;
    reply[20..].copy_from_slice(&bittorrent::tracker_client::common::encode_compact_peers(&outcome.peers));
    Some(reply)
}

async fn handle_scrape(datagram: &[u8], transaction_id: u32, state: &AppState) -> Option<Vec<u8>> {
    let info_hashes: Vec<[u8; 20]> = datagram[16..].chunks_exact(20).map(|chunk| chunk.try_into().unwrap()).collect();

    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .requests
        .send(TrackerRequest::Scrape { info_hashes: info_hashes.clone(), reply: reply_tx })
        .await
        .ok()?;
    let stats = reply_rx.await.ok()?;

    let mut reply = vec![0u8; 8 + 12 * info_hashes.len()];
    write_uint(u64::from(ACTION_SCRAPE), &mut reply, 4, 0).ok()?;
    write_uint(u64::from(transaction_id), &mut reply, 4, 4).ok()?;
    for (i, hash) in info_hashes.iter().enumerate() {
        let s = stats
            .get(hash)
            .cloned()
            .unwrap_or(bittorrent::tracker_client::ScrapeStats { complete: 0, downloaded: 0, incomplete: 0 });
        let off = 8 + i * 12;
        write_uint(u64::from(s.complete), &mut reply, 4, off).ok()?;
        write_uint(u64::from(s.downloaded), &mut reply, 4, off + 4).ok()?;
        write_uint(u64::from(s.incomplete), &mut reply, 4, off + 8).ok()?;
    }
    Some(reply)
}
