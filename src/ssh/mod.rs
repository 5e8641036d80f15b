//! SSH transport: connection establishment, exec channels, liveness probing.

mod client;
mod connector;

pub use client::RemoteSession;
pub use connector::Connector;
