//! Live session and broadcast core: connection lifecycle, presence,
//! message routing and fan-out.

pub mod config;
pub mod connection;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod presence;
pub mod router;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use config::{ClearPolicy, GatewayConfig};
pub use supervisor::{Gateway, Inbound, Supervisor};
