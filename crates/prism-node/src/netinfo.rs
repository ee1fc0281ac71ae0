//! Local network interface inspection
//!
//! Resolves the address and subnet a node announces on, either from a
//! named interface or from the first usable one.

use anyhow::{anyhow, Context};
use ipnetwork::{IpNetwork, Ipv4Network};
use pnet::datalink;
use std::net::IpAddr;

/// What the node knows about its place on the network.
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub hostname: String,
    pub network: Ipv4Network,
}

impl NetworkInfo {
    pub fn addr(&self) -> std::net::Ipv4Addr {
        self.network.ip()
    }
}

/// Resolve the announcing interface. With a name, that interface must
/// exist and carry an IPv4 address; without one, the first up,
/// non-loopback interface wins, falling back to the default-route local
/// address with an assumed /24.
pub fn resolve(interface: Option<&str>) -> anyhow::Result<NetworkInfo> {
    let hostname = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    if let Some(name) = interface {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| anyhow!("interface {} not found", name))?;
        let network = first_v4(&iface)
            .ok_or_else(|| anyhow!("no IPv4 address on interface {}", name))?;
        return Ok(NetworkInfo { hostname, network });
    }

    for iface in datalink::interfaces() {
        if iface.is_up() && !iface.is_loopback() {
            if let Some(network) = first_v4(&iface) {
                return Ok(NetworkInfo { hostname, network });
            }
        }
    }

    let addr = local_ip_address::local_ip().context("no usable network interface found")?;
    match addr {
        IpAddr::V4(v4) => Ok(NetworkInfo {
            hostname,
            network: Ipv4Network::new(v4, 24)?,
        }),
        IpAddr::V6(_) => Err(anyhow!("IPv6-only hosts are not supported")),
    }
}

fn first_v4(iface: &datalink::NetworkInterface) -> Option<Ipv4Network> {
    iface.ips.iter().find_map(|ip| match ip {
        IpNetwork::V4(v4) => Some(*v4),
        IpNetwork::V6(_) => None,
    })
}
