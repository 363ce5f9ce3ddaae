// connect-then-act, 15s * 2^attempt backoff over 8 attempts. connection id
// is cached for 60s as a deadline checked before use, not a timer callback.
use super::common::{decode_compact_peers, AnnounceInfo, AnnounceResponse, ScrapeStats};
use crate::error::Error;
use crate::util::{read_uint, write_uint};
use rand::RngCore;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

const MAGIC: u64 = 0x0000_0417_2710_1980;
const MAX_ATTEMPTS: u32 = 8;
const CONNECTION_ID_TTL: Duration = Duration::from_secs(60);

fn attempt_timeout(attempt: u32) -> Duration {
    Duration::from_secs(15 * 2u64.pow(attempt))
}

fn random_u32() -> u32 {
    rand::rng().next_u32()
}

pub struct UdpTrackerClient {
    socket: UdpSocket,
    cached: Option<(u64, Instant)>,
}

impl UdpTrackerClient {
    pub async fn connect(remote: &str) -> Result<Self, Error> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(remote).await?;
        Ok(Self { socket, cached: None })
    }

    fn cached_connection_id(&self) -> Option<u64> {
        self.cached.and_then(|(id, expiry)| (Instant::now() < expiry).then_some(id))
    }

    async fn exchange<T>(
        &mut self,
        build_request: impl Fn(u64, u32) -> Vec<u8>,
        parse: impl Fn(&[u8], u32) -> Result<T, Error>,
    ) -> Result<T, Error> {
        for attempt in 0..MAX_ATTEMPTS {
            let budget = attempt_timeout(attempt);
            match timeout(budget, self.try_once(&build_request, &parse)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(_)) | Err(_) => continue,
            }
        }
        Err(Error::Timeout("udp tracker exchange exhausted all attempts".into()))
    }

    async fn try_once<T>(
        &mut self,
        build_request: impl Fn(u64, u32) -> Vec<u8>,
        parse: impl Fn(&[u8], u32) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let connection_id = match self.cached_connection_id() {
            Some(id) => id,
            None => self.do_connect().await?,
        };
        let transaction_id = random_u32();
        let request = build_request(connection_id, transaction_id);
        self.socket.send(&request).await?;

        let mut buf = [0u8; 2048];
        loop {
            let n = self.socket.recv(&mut buf).await?;
            let reply = &buf[..n];
            if reply.len() < 8 {
                continue;
            }
            let reply_txid = read_uint(reply, 4, 4)? as u32;
            if reply_txid != transaction_id {
                continue;
            }
            let action = read_uint(reply, 4, 0)?;
            if action == 3 && reply.len() >= 9 {
                return Err(Error::TrackerRejected(
                    String::from_utf8_lossy(&reply[8..]).into_owned(),
                ));
            }
            return parse(reply, transaction_id);
        }
    }

    async fn do_connect(&mut self) -> Result<u64, Error> {
        let transaction_id = random_u32();
        let mut request = vec![0u8; 16];
        write_uint(MAGIC, &mut request, 8, 0)?;
        write_uint(0, &mut request, 4, 8)?;
        write_uint(u64::from(transaction_id), &mut request, 4, 12)?;
        self.socket.send(&request).await?;

        let mut buf = [0u8; 16];
        loop {
            let n = self.socket.recv(&mut buf).await?;
            if n < 16 {
                return Err(Error::TrackerRejected("connect reply shorter than 16 bytes".into()));
            }
            let action = read_uint(&buf, 4, 0)?;
            let reply_txid = read_uint(&buf, 4, 4)? as u32;
            if reply_txid != transaction_id {
                continue;
            }
            if action != 0 {
                return Err(Error::TrackerRejected(format!("connect reply has action {action}")));
            }
            let connection_id = read_uint(&buf, 8, 8)?;
            self.cached = Some((connection_id, Instant::now() + CONNECTION_ID_TTL));
            return Ok(connection_id);
        }
    }

    pub async fn announce(&mut self, info: &AnnounceInfo) -> Result<AnnounceResponse, Error> {
        let info_hash = info.info_hash;
        let peer_id = *info.peer_id.as_bytes();
        let key = {
            let mut k = [0u8; 4];
            let n = info.key.len().min(4);
            k[..n].copy_from_slice(&info.key[..n]);
            k
        };
        let downloaded = info.downloaded;
        let left = info.left;
        let uploaded = info.uploaded;
        let event = match info.event {
            super::common::AnnounceEvent::Empty => 0u32,
            super::common::AnnounceEvent::Completed => 1,
            super::common::AnnounceEvent::Started => 2,
            super::common::AnnounceEvent::Stopped => 3,
        };
        let ip = info.ip.map(u32::from).unwrap_or(0);
        let num_want = info.num_want;
        let port = info.port;

        self.exchange(
            move |connection_id, transaction_id| {
                let mut request = vec![0u8; 98];
                write_uint(connection_id, &mut request, 8, 0).unwrap();
                write_uint(1, &mut request, 4, 8).unwrap();
                write_uint(u64::from(transaction_id), &mut request, 4, 12).unwrap();
                request[16..36].copy_from_slice(&info_hash);
                request[36..56].copy_from_slice(&peer_id);
                write_uint(downloaded, &mut request, 8, 56).unwrap();
                write_uint(left, &mut request, 8, 64).unwrap();
                write_uint(uploaded, &mut request, 8, 72).unwrap();
                write_uint(u64::from(event), &mut request, 4, 80).unwrap();
                write_uint(u64::from(ip), &mut request, 4, 84).unwrap();
                request[88..92].copy_from_slice(&key);
                write_uint(u64::from(num_want), &mut request, 4, 92).unwrap();
                write_uint(u64::from(port), &mut request, 2, 96).unwrap();
                request
            },
            |reply, _| {
                if reply.len() < 20 {
                    return Err(Error::TrackerRejected("announce reply shorter than 20 bytes".into()));
                }
                let interval = read_uint(reply, 4, 8)? as u32;
                let incomplete = read_uint(reply, 4, 12)? as u32;
                let complete = read_uint(reply, 4, 16)? as u32;
                let peers = decode_compact_peers(&reply[20..])?;
                Ok(AnnounceResponse { interval, complete, incomplete, peers })
            },
        )
        .await
    }

    pub async fn scrape(&mut self, info_hashes: &[[u8; 20]]) -> Result<BTreeMap<[u8; 20], ScrapeStats>, Error> {
        let hashes = info_hashes.to_vec();
        let result: Vec<(u32, u32, u32)> = self
            .exchange(
                move |connection_id, transaction_id| {
                    let mut request = vec![0u8; 16 + 20 * hashes.len()];
                    write_uint(connection_id, &mut request, 8, 0).unwrap();
                    write_uint(2, &mut request, 4, 8).unwrap();
                    write_uint(u64::from(transaction_id), &mut request, 4, 12).unwrap();
                    for (i, hash) in hashes.iter().enumerate() {
                        request[16 + i * 20..16 + (i + 1) * 20].copy_from_slice(hash);
                    }
                    request
                },
                |reply, _| {
                    if reply.len() < 8 {
                        return Err(Error::TrackerRejected("scrape reply shorter than 8 bytes".into()));
                    }
                    reply[8..]
                        .chunks_exact(12)
                        .map(|chunk| {
                            Ok((
                                u32::from_be_bytes(chunk[0..4].try_into().unwrap()),
                                u32::from_be_bytes(chunk[4..8].try_into().unwrap()),
                                u32::from_be_bytes(chunk[8..12].try_into().unwrap()),
                            ))
                        })
                        .collect()
                },
            )
            .await?;

        Ok(info_hashes
            .iter()
            .zip(result)
            .map(|(hash, (complete, downloaded, incomplete))| {
                (*hash, ScrapeStats { complete, downloaded, incomplete })
            })
            .collect())
    }
}
