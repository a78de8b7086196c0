use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::Router;

use serde::Deserialize;

use tracing::info;

use webthing::thing_set::ThingSet;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::hosts::{AllowedHosts, HostValidation};
use crate::hub::{DEFAULT_SUBSCRIBER_BUFFER, SubscriptionHub};
use crate::network::{LocalNetwork, NetworkInfo};
use crate::router::{ServerState, router};
#[cfg(feature = "mdns")]
use crate::services::{Service, ServiceConfig};

// Default HTTP address.
//
// The entire local network is considered, so the Ipv4 unspecified address is
// used.
pub(crate) const DEFAULT_HTTP_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

// Default port.
pub(crate) const DEFAULT_SERVER_PORT: u16 = 8888;

/// The threading model of a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionModel {
    /// Requests and `WebSocket` connections are served cooperatively on the
    /// calling thread.
    #[default]
    InProcess,
    /// Requests and `WebSocket` connections are served by a pool of worker
    /// threads.
    WorkerPool(NonZeroUsize),
}

/// A server exposing a [`ThingSet`] over `HTTP` and `WebSocket`.
pub struct Server {
    // Things.
    things: Arc<ThingSet>,
    // HTTP address.
    http_address: IpAddr,
    // Server port.
    port: u16,
    // Public hostname.
    hostname: Option<String>,
    // Host header validation policy.
    host_validation: HostValidation,
    // Threading model.
    execution_model: ExecutionModel,
    // Messages buffered for each WebSocket connection.
    subscriber_buffer: usize,
    // Network identity.
    network: Arc<dyn NetworkInfo>,
    // Discovery service configurator.
    #[cfg(feature = "mdns")]
    service_config: Option<ServiceConfig>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("things", &self.things)
            .field("http_address", &self.http_address)
            .field("port", &self.port)
            .field("hostname", &self.hostname)
            .field("host_validation", &self.host_validation)
            .field("execution_model", &self.execution_model)
            .field("subscriber_buffer", &self.subscriber_buffer)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a [`Server`] from the given [`ThingSet`].
    #[must_use]
    pub fn new(things: ThingSet) -> Self {
        Self {
            things: Arc::new(things),
            http_address: DEFAULT_HTTP_ADDRESS,
            port: DEFAULT_SERVER_PORT,
            hostname: None,
            host_validation: HostValidation::Enforce,
            execution_model: ExecutionModel::InProcess,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            network: Arc::new(LocalNetwork),
            #[cfg(feature = "mdns")]
            service_config: None,
        }
    }

    /// Creates a [`Server`] from the given [`ThingSet`] and
    /// [`ServerConfig`].
    #[must_use]
    pub fn from_config(things: ThingSet, config: &ServerConfig) -> Self {
        let server = Self::new(things)
            .address(config.address)
            .port(config.port)
            .host_validation(config.host_validation)
            .execution_model(config.execution)
            .subscriber_buffer(config.subscriber_buffer);

        let server = match &config.hostname {
            Some(hostname) => server.hostname(hostname.clone()),
            None => server,
        };

        #[cfg(feature = "mdns")]
        let server = if config.discovery {
            server.discovery_service(ServiceConfig::mdns_sd())
        } else {
            server
        };

        server
    }

    /// Sets the server `IP` address.
    #[must_use]
    pub const fn address(mut self, http_address: IpAddr) -> Self {
        self.http_address = http_address;
        self
    }

    /// Sets the server port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the public hostname of the server. i.e. `mything.example.com`
    ///
    /// The hostname is accepted as a `Host` header.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Sets the `Host` header validation policy.
    #[must_use]
    pub const fn host_validation(mut self, host_validation: HostValidation) -> Self {
        self.host_validation = host_validation;
        self
    }

    /// Sets the threading model used by [`Server::serve`].
    #[must_use]
    pub const fn execution_model(mut self, execution_model: ExecutionModel) -> Self {
        self.execution_model = execution_model;
        self
    }

    /// Sets the number of messages a `WebSocket` connection can lag behind
    /// before being dropped.
    #[must_use]
    pub const fn subscriber_buffer(mut self, subscriber_buffer: usize) -> Self {
        self.subscriber_buffer = subscriber_buffer;
        self
    }

    /// Sets the provider of the server network identity.
    #[must_use]
    pub fn network_info(mut self, network: impl NetworkInfo + 'static) -> Self {
        self.network = Arc::new(network);
        self
    }

    /// Sets the configuration for the discovery service.
    #[cfg(feature = "mdns")]
    #[must_use]
    #[inline]
    pub fn discovery_service(mut self, service_config: ServiceConfig) -> Self {
        self.service_config = Some(service_config);
        self
    }

    /// Builds the [`Router`] serving the things.
    ///
    /// Useful to embed the things in another `axum` application.
    #[must_use]
    pub fn router(&self) -> Router {
        let hosts = AllowedHosts::new(
            self.host_validation,
            self.port,
            self.hostname.as_deref(),
            self.network.as_ref(),
        );

        let state = ServerState {
            things: Arc::clone(&self.things),
            hub: Arc::new(SubscriptionHub::new(&self.things, self.subscriber_buffer)),
        };

        router(state, Arc::new(hosts))
    }

    /// Transforms the server into a [`GracefulShutdownServer`].
    ///
    /// The [`Future`] passed as input manages the graceful shutdown of
    /// the server.
    #[must_use]
    #[inline]
    pub fn with_graceful_shutdown<F>(self, signal: F) -> GracefulShutdownServer<F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        GracefulShutdownServer {
            server: self,
            signal,
        }
    }

    /// Runs the server on the current asynchronous runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start.
    pub async fn run(self) -> Result<()> {
        self.with_graceful_shutdown(std::future::pending())
            .run()
            .await
    }

    /// Runs the server on a new runtime built according to the
    /// [`ExecutionModel`], blocking the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built or the server fails
    /// to start.
    pub fn serve(self) -> Result<()> {
        self.with_graceful_shutdown(std::future::pending())
            .serve()
    }
}

/// A server with graceful shutdown.
///
/// Aside from the graceful shutdown functionality, it behaves the same as
/// [`Server`].
#[derive(Debug)]
pub struct GracefulShutdownServer<F> {
    // Server.
    server: Server,
    // Graceful shutdown signal.
    signal: F,
}

impl<F> GracefulShutdownServer<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    /// Runs the server with graceful shutdown on the current asynchronous
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start.
    pub async fn run(self) -> Result<()> {
        let server = self.server;
        let listener_bind = SocketAddr::new(server.http_address, server.port);

        let router = server.router();

        // Announce the server on the network if requested.
        #[cfg(feature = "mdns")]
        let service = match server.service_config {
            Some(service_config) => Some(Service::run(
                service_config,
                server.things.get_name(),
                &server.network.hostname(),
                &server.network.addresses(),
                server.port,
            )?),
            None => None,
        };

        info!(
            "Serving {} thing(s) at this HTTP address: {listener_bind}",
            server.things.get_things().len()
        );

        let listener = tokio::net::TcpListener::bind(listener_bind).await?;

        info!("Starting server...");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(self.signal)
            .await;

        #[cfg(feature = "mdns")]
        if let Some(service) = service {
            service.stop();
        }

        info!("Server stopped");

        served.map_err(Into::into)
    }

    /// Runs the server with graceful shutdown on a new runtime built
    /// according to the [`ExecutionModel`], blocking the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built or the server fails
    /// to start.
    pub fn serve(self) -> Result<()> {
        let mut builder = match self.server.execution_model {
            ExecutionModel::InProcess => tokio::runtime::Builder::new_current_thread(),
            ExecutionModel::WorkerPool(workers) => {
                let mut builder = tokio::runtime::Builder::new_multi_thread();
                builder.worker_threads(workers.get());
                builder
            }
        };

        info!("Execution model: {:?}", self.server.execution_model);

        let runtime = builder.enable_all().build()?;
        runtime.block_on(self.run())
    }
}
