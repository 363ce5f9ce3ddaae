use async_trait::async_trait;
use std::net::IpAddr;

#[async_trait]
pub trait NatMapper: Send + Sync {
    // returns (internal_ip, external_ip)
    async fn get_ip_addrs_and_map_port(&self, port: u16) -> anyhow::Result<(IpAddr, IpAddr)>;
}

// always fails, so Client falls back to its unmapped local address
pub struct NoopNat;

#[async_trait]
impl NatMapper for NoopNat {
    async fn get_ip_addrs_and_map_port(&self, _port: u16) -> anyhow::Result<(IpAddr, IpAddr)> {
        Err(anyhow::anyhow!("no NAT mapper configured"))
    }
}
