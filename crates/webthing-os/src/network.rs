use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use tracing::{debug, warn};

// Hostname used when the system one cannot be retrieved.
const DEFAULT_HOSTNAME: &str = "webthing";

// An unroutable address, only used to select the outbound interface.
const PROBE_ADDRESS: (Ipv4Addr, u16) = (Ipv4Addr::new(10, 255, 255, 255), 1);

/// A provider of the network identity of the server.
///
/// It supplies the addresses and the hostname under which the server is
/// reachable, used to build the list of allowed `Host` headers and to
/// announce the server on the network.
pub trait NetworkInfo: Send + Sync {
    /// Returns the local addresses of the server.
    fn addresses(&self) -> Vec<IpAddr>;

    /// Returns the system hostname, without the `.local` suffix.
    fn hostname(&self) -> String;
}

/// The network identity of the host running the server.
///
/// The addresses are the loopback address and the address of the
/// interface used to reach the network, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalNetwork;

impl LocalNetwork {
    fn outbound_address() -> Option<IpAddr> {
        // No packet is sent, connecting only selects the route.
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
        socket.connect(PROBE_ADDRESS).ok()?;
        socket.local_addr().ok().map(|address| address.ip())
    }
}

impl NetworkInfo for LocalNetwork {
    fn addresses(&self) -> Vec<IpAddr> {
        let mut addresses = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
        match Self::outbound_address() {
            Some(address) if !addresses.contains(&address) && !address.is_unspecified() => {
                debug!("Outbound address: {address}");
                addresses.push(address);
            }
            Some(_) => {}
            None => warn!("Impossible to retrieve the outbound address"),
        }
        addresses
    }

    fn hostname(&self) -> String {
        std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
            .map(|hostname| hostname.trim().to_lowercase())
            .filter(|hostname| !hostname.is_empty())
            .unwrap_or_else(|| DEFAULT_HOSTNAME.into())
    }
}

/// A fixed network identity.
#[derive(Debug, Clone)]
pub struct StaticNetwork {
    addresses: Vec<IpAddr>,
    hostname: String,
}

impl StaticNetwork {
    /// Creates a [`StaticNetwork`].
    #[must_use]
    pub fn new(addresses: impl IntoIterator<Item = IpAddr>, hostname: impl Into<String>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
            hostname: hostname.into(),
        }
    }
}

impl NetworkInfo for StaticNetwork {
    fn addresses(&self) -> Vec<IpAddr> {
        self.addresses.clone()
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::{LocalNetwork, NetworkInfo};

    #[test]
    fn local_network_has_loopback() {
        let network = LocalNetwork;

        assert_eq!(
            network.addresses().first(),
            Some(&IpAddr::V4(Ipv4Addr::LOCALHOST))
        );
        assert!(!network.hostname().is_empty());
    }
}
