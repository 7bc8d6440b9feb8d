//! BTLE central/peripheral abstraction: vendor-neutral GATT client/server
//! traits, per-connection and persistent-connection-manager state
//! machines, UUID normalization, and advertisement (de)serialization.

pub mod advertisement;
pub mod central;
pub mod connection;
pub mod connection_manager;
pub mod peripheral;
pub mod uuid;
