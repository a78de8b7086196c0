//! The `webthing` library crate provides the data model of a Web Thing.
//!
//! A thing is a device or a service which exposes:
//!
//! - **Properties**: typed attributes whose client writes are validated
//!   against a declarative schema
//! - **Actions**: operations requested by clients and run out-of-band,
//!   each one moving through a status lifecycle
//! - **Events**: timestamped occurrences retained in a bounded queue
//!
//! Every property change, event and action status change is pushed to the
//! observers of a thing, so a server can forward them to its clients.
//!
//! One or more things are grouped in a [`thing_set::ThingSet`], which
//! defines how each thing is addressed by a server.
//!
//! This crate is transport agnostic. The `webthing-os` crate serves a
//! [`thing_set::ThingSet`] over `HTTP` and `WebSocket`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Requested actions, their input schemas and their lifecycle.
pub mod action;
/// Error management.
pub mod error;
/// Occurred events and their bounded queue.
pub mod event;
/// Messages pushed to thing observers.
pub mod message;
/// An ordered list of observers identified by stable tokens.
pub mod observer;
/// Schema-validated properties.
pub mod property;
/// Data schemas and their validation.
pub mod schema;
/// A thing and its description.
pub mod thing;
/// Addressing of one or more things.
pub mod thing_set;
/// Observable property values.
pub mod value;
