use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use indexmap::IndexSet;

use serde::Deserialize;

use tracing::{debug, warn};

use crate::network::NetworkInfo;
use crate::responses::error::ErrorResponse;

const ALLOWED_ORIGIN: &str = "*";
const ALLOWED_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";
const ALLOWED_METHODS: &str = "GET, HEAD, PUT, POST, DELETE";

/// The `Host` header validation policy.
///
/// The policy applies to every route, `WebSocket` upgrades included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostValidation {
    /// Requests whose `Host` header is not among the allowed hosts are
    /// rejected with `403 Forbidden`.
    #[default]
    Enforce,
    /// Every `Host` header is accepted.
    Disabled,
}

/// The hosts a server is reachable at.
#[derive(Debug, Clone)]
pub(crate) struct AllowedHosts {
    policy: HostValidation,
    hosts: IndexSet<String>,
}

impl AllowedHosts {
    pub(crate) fn new(
        policy: HostValidation,
        port: u16,
        hostname: Option<&str>,
        network: &dyn NetworkInfo,
    ) -> Self {
        let mut hosts = IndexSet::new();
        let mut allow = |host: String| {
            hosts.insert(format!("{host}:{port}"));
            hosts.insert(host);
        };

        allow("localhost".into());
        allow(format!("{}.local", network.hostname().to_lowercase()));
        for address in network.addresses() {
            allow(match address {
                IpAddr::V4(address) => address.to_string(),
                IpAddr::V6(address) => format!("[{address}]"),
            });
        }
        if let Some(hostname) = hostname {
            allow(hostname.to_lowercase());
        }

        debug!("Allowed hosts: {hosts:?}");
        Self { policy, hosts }
    }

    pub(crate) fn is_allowed(&self, host: Option<&str>) -> bool {
        match self.policy {
            HostValidation::Disabled => true,
            HostValidation::Enforce => {
                host.is_some_and(|host| self.hosts.contains(host.to_lowercase().as_str()))
            }
        }
    }
}

pub(crate) fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
}

fn add_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOWED_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
}

// Validates the `Host` header of every request, answers preflight requests
// and adds the CORS headers to every response.
pub(crate) async fn host_middleware(
    State(hosts): State<Arc<AllowedHosts>>,
    request: Request,
    next: Next,
) -> Response {
    let host = request_host(request.headers()).map(ToOwned::to_owned);
    if !hosts.is_allowed(host.as_deref()) {
        let host = host.unwrap_or_default();
        warn!(
            "Rejected {} {} from host `{host}`",
            request.method(),
            request.uri()
        );
        return ErrorResponse::host_rejected(&host).into_response();
    }

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    add_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use crate::network::StaticNetwork;

    use super::{AllowedHosts, HostValidation};

    fn hosts(policy: HostValidation) -> AllowedHosts {
        AllowedHosts::new(
            policy,
            8888,
            Some("MyThing.example.com"),
            &StaticNetwork::new(
                [
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
                    IpAddr::V6(Ipv6Addr::LOCALHOST),
                ],
                "lamp",
            ),
        )
    }

    #[test]
    fn allowed_hosts() {
        let hosts = hosts(HostValidation::Enforce);

        for host in [
            "localhost",
            "localhost:8888",
            "LOCALHOST:8888",
            "lamp.local",
            "lamp.local:8888",
            "127.0.0.1",
            "192.168.1.20:8888",
            "[::1]:8888",
            "mything.example.com",
            "mything.example.com:8888",
        ] {
            assert!(hosts.is_allowed(Some(host)), "{host} must be allowed");
        }
    }

    #[test]
    fn rejected_hosts() {
        let hosts = hosts(HostValidation::Enforce);

        for host in [
            Some("evil.example.com"),
            Some("localhost:8080"),
            Some("192.168.1.21"),
            Some(""),
            None,
        ] {
            assert!(!hosts.is_allowed(host), "{host:?} must be rejected");
        }
    }

    #[test]
    fn disabled_validation() {
        let hosts = hosts(HostValidation::Disabled);

        assert!(hosts.is_allowed(Some("evil.example.com")));
        assert!(hosts.is_allowed(None));
    }
}
