#![deny(warnings)]

//! SCGI gateway with broker-mediated socket handoff.
//!
//! The gateway is two cooperating binaries. A broker binds the public
//! workload socket once and keeps it open for the lifetime of the host,
//! handing a duplicate of the listening file descriptor to each receiver
//! process that connects to its control channel and asks for one. Each
//! receiver accepts SCGI connections on the handed-off socket, parses the
//! SCGI header block, synthesizes a request environment, and drives an
//! [`Application`](application::Application) to produce a response.
//!
//! This crate is organized bottom-up: wire codecs first
//! ([`netstring`], [`socket_description`]), then request parsing
//! ([`header`], [`environment`]), then response sequencing
//! ([`response`]), then the two process roles that compose them
//! ([`broker`], [`receiver`]).

pub mod application;
pub mod broker;
pub mod endpoint;
pub mod environment;
pub mod error;
pub mod header;
pub mod netstring;
pub mod receiver;
pub mod response;
pub mod signals;
pub mod socket_description;
pub mod tracing_support;
