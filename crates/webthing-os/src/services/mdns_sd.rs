use std::collections::HashMap;
use std::net::IpAddr;

use mdns_sd::{IfKind, ServiceDaemon, ServiceInfo};

use tracing::{info, warn};

use crate::error::Result;

use super::ServiceConfig;

// An `mDNS-SD` announcement of the server.
pub(crate) struct Service {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Service {
    pub(crate) fn run(
        service_config: ServiceConfig,
        default_instance_name: &str,
        default_hostname: &str,
        addresses: &[IpAddr],
        port: u16,
    ) -> Result<Self> {
        let daemon = ServiceDaemon::new()?;

        if service_config.disable_ipv6 {
            daemon.disable_interface(IfKind::IPv6)?;
        }

        if let Some(ip) = service_config.disable_ip {
            daemon.disable_interface(ip)?;
        }

        if let Some(network_interface) = service_config.disable_network_interface.as_deref() {
            daemon.disable_interface(network_interface)?;
        }

        let service_info = service_info(
            service_config,
            default_instance_name,
            default_hostname,
            addresses,
            port,
        )?;
        let fullname = service_info.get_fullname().to_owned();
        let hostname = service_info.get_hostname().to_owned();

        daemon.register(service_info)?;

        info!("Service `{fullname}` announced as `{hostname}` on port {port}");

        Ok(Self { daemon, fullname })
    }

    pub(crate) fn stop(self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!("Impossible to withdraw `{}`: {e}", self.fullname);
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!("Impossible to stop the discovery service: {e}");
        }
        info!("Service `{}` withdrawn", self.fullname);
    }
}

// Builds the announced service record.
fn service_info(
    service_config: ServiceConfig,
    default_instance_name: &str,
    default_hostname: &str,
    addresses: &[IpAddr],
    port: u16,
) -> Result<ServiceInfo> {
    let addresses: Vec<IpAddr> = addresses
        .iter()
        .filter(|address| !address.is_loopback())
        .filter(|address| !(service_config.disable_ipv6 && address.is_ipv6()))
        .filter(|address| service_config.disable_ip != Some(**address))
        .copied()
        .collect();

    let instance_name = service_config
        .instance_name
        .as_deref()
        .unwrap_or(default_instance_name);

    let hostname = format!(
        "{}.{}.",
        service_config
            .hostname
            .as_deref()
            .unwrap_or(default_hostname),
        service_config.top_level_domain
    );

    let service_type = service_config.full_service_type();
    let properties: HashMap<String, String> = service_config.properties.into_iter().collect();

    ServiceInfo::new(
        &service_type,
        instance_name,
        &hostname,
        addresses.as_slice(),
        port,
        properties,
    )
    .map_err(Into::into)
}
