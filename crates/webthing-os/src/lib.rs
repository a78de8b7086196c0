//! `webthing-os` is a library for serving Web Things from devices running
//! on operating systems.
//!
//! A [`webthing::thing_set::ThingSet`] is exposed through a REST interface,
//! where every thing publishes its description, its properties, its actions
//! and its events, plus a `WebSocket` channel pushing each property change,
//! event and action status change to the connected clients.
//!
//! Each request is checked against the list of hosts the server is
//! reachable at, and every response carries the CORS headers, so a browser
//! application can drive the things directly.
//!
//! When the `mdns` feature is enabled, the server can announce itself on
//! the local network as a `_webthing._tcp` service.
//!
//! An `std` environment is required to obtain full crate functionality.

#![deny(unsafe_code)]
#![deny(missing_docs)]

pub use webthing;

/// Server configuration.
pub mod config;
/// Error management.
pub mod error;
/// The `Host` header validation policy.
pub mod host {
    pub use crate::hosts::HostValidation;
}
/// The registry of `WebSocket` subscribers.
pub mod hub;
/// The network identity of the server.
pub mod network;
/// All responses kinds along with their payloads.
pub mod responses;
/// The Web Thing server.
pub mod server;
/// The discovery service used to make the server detectable on the network.
#[cfg(feature = "mdns")]
pub mod service {
    pub use super::services::{ServiceConfig, TransportProtocol};
}

mod hosts;
mod router;
#[cfg(feature = "mdns")]
mod services;

#[cfg(test)]
mod tests;
