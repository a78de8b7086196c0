mod mdns_sd;

pub(crate) use mdns_sd::Service;

use std::net::IpAddr;

use indexmap::IndexMap;

// Service type announced by web things.
const SERVICE_TYPE: &str = "_webthing";

// Service top-level domain.
//
// It defines the default top-level domain for a service.
const TOP_LEVEL_DOMAIN: &str = "local";

/// The discovery service transport protocol.
#[derive(Debug, Clone, Copy)]
pub enum TransportProtocol {
    /// TCP-based service.
    TCP,
    /// UDP-based service.
    UDP,
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.name().fmt(f)
    }
}

impl TransportProtocol {
    /// Returns the [`TransportProtocol`] name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TCP => "tcp",
            Self::UDP => "udp",
        }
    }
}

/// A discovery service configuration.
///
/// The server is announced as a `_webthing._tcp.local.` service by default.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    // Instance name. When absent, the name of the thing set is used.
    pub(crate) instance_name: Option<String>,
    // Service host name. When absent, the system hostname is used.
    pub(crate) hostname: Option<String>,
    // Service type.
    pub(crate) service_type: String,
    // Service transport protocol.
    pub(crate) transport_protocol: TransportProtocol,
    // Top-level domain.
    pub(crate) top_level_domain: String,
    // Service properties.
    pub(crate) properties: IndexMap<String, String>,
    // Disable IPv6.
    pub(crate) disable_ipv6: bool,
    // Disable IP.
    pub(crate) disable_ip: Option<IpAddr>,
    // Disable network interface.
    pub(crate) disable_network_interface: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::mdns_sd()
    }
}

impl ServiceConfig {
    /// Creates a [`ServiceConfig`] for an `mDNS-SD` discovery service.
    ///
    /// The service advertises the `path=/` property, pointing clients at
    /// the root of the server.
    #[must_use]
    pub fn mdns_sd() -> Self {
        let mut properties = IndexMap::new();
        properties.insert("path".into(), "/".into());

        Self {
            instance_name: None,
            hostname: None,
            service_type: SERVICE_TYPE.into(),
            transport_protocol: TransportProtocol::TCP,
            top_level_domain: TOP_LEVEL_DOMAIN.into(),
            properties,
            disable_ipv6: false,
            disable_ip: None,
            disable_network_interface: None,
        }
    }

    /// Sets the instance name.
    #[must_use]
    pub fn instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = Some(instance_name.into());
        self
    }

    /// Sets a discovery service property.
    ///
    /// For example, a property might be the board running the server.
    /// i.e. ("board", "raspberry-pi")
    #[must_use]
    pub fn property(mut self, property: (impl Into<String>, impl Into<String>)) -> Self {
        self.properties.insert(property.0.into(), property.1.into());
        self
    }

    /// Sets the service hostname.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Sets the service transport protocol.
    #[must_use]
    pub const fn transport_protocol(mut self, transport_protocol: TransportProtocol) -> Self {
        self.transport_protocol = transport_protocol;
        self
    }

    /// Sets the service type. i.e. `_webthing`
    #[must_use]
    pub fn service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Sets the service top-level domain.
    ///
    /// A common top-level domain is `.local`.
    #[must_use]
    pub fn top_level_domain(mut self, top_level_domain: impl Into<String>) -> Self {
        self.top_level_domain = top_level_domain.into();
        self
    }

    /// Excludes `IPv6` interfaces from the discovery service.
    #[must_use]
    pub const fn disable_ipv6(mut self) -> Self {
        self.disable_ipv6 = true;
        self
    }

    /// Excludes the given `IP` from the discovery service.
    #[must_use]
    #[inline]
    pub fn disable_ip(mut self, ip: impl Into<IpAddr>) -> Self {
        self.disable_ip = Some(ip.into());
        self
    }

    /// Disables the given network interface from the discovery service.
    #[must_use]
    pub fn disable_network_interface(mut self, network_interface: impl Into<String>) -> Self {
        self.disable_network_interface = Some(network_interface.into());
        self
    }

    // Returns the fully qualified service type.
    // i.e. `_webthing._tcp.local.`
    pub(crate) fn full_service_type(&self) -> String {
        format!(
            "{}._{}.{}.",
            self.service_type, self.transport_protocol, self.top_level_domain
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{ServiceConfig, TransportProtocol};

    #[test]
    fn full_service_type() {
        assert_eq!(
            ServiceConfig::mdns_sd().full_service_type(),
            "_webthing._tcp.local."
        );
        assert_eq!(
            ServiceConfig::mdns_sd()
                .service_type("_lamp")
                .transport_protocol(TransportProtocol::UDP)
                .full_service_type(),
            "_lamp._udp.local."
        );
    }

    #[test]
    fn default_properties() {
        let config = ServiceConfig::mdns_sd().property(("board", "raspberry-pi"));

        assert_eq!(config.properties.get("path").map(String::as_str), Some("/"));
        assert_eq!(
            config.properties.get("board").map(String::as_str),
            Some("raspberry-pi")
        );
    }
}
