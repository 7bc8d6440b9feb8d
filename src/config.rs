//! Core configuration parameters.
//!
//! All tunable parameters for the buffer/framer/RPC/MQTT/BTLE stack.
//! Values can be overridden via a `KeyValueStore` at startup.

use serde::{Deserialize, Serialize};

/// Core framework configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    // --- Message pool ---
    /// Number of reusable buffers in the framer's message pool.
    pub message_pool_size: u8,

    // --- RPC node tree ---
    /// Max subnodes per `RpcNode`.
    pub rpc_max_subnodes: u8,
    /// Max methods registered per `RpcNode`.
    pub rpc_max_methods: u8,
    /// Max concurrently inflight synchronous requests per `RpcNode`.
    pub rpc_max_inflight_requests: u8,
    /// Default timeout for `send_request_sync` when the caller doesn't specify one.
    pub rpc_default_request_timeout_ms: u32,

    // --- MQTT ---
    /// Max concurrent subscriptions tracked by one `MqttClient`.
    pub mqtt_max_subscriptions: u8,
    /// Seconds between PINGREQs while connected.
    pub mqtt_keepalive_s: u16,
    /// Milliseconds to wait for CONNACK before giving up.
    pub mqtt_connect_timeout_ms: u32,

    // --- BTLE ---
    /// Milliseconds a single GATT procedure (discover/read/write/subscribe) may take.
    pub btle_procedure_timeout_ms: u32,
    /// Milliseconds the connection manager waits after a disconnect before reconnecting.
    pub btle_reconnect_standoff_ms: u32,
    /// Max simultaneous notification subscriptions tracked by one central.
    pub btle_max_subscriptions: u8,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            // Message pool
            message_pool_size: 3,

            // RPC node tree
            rpc_max_subnodes: 5,
            rpc_max_methods: 5,
            rpc_max_inflight_requests: 2,
            rpc_default_request_timeout_ms: 5_000,

            // MQTT
            mqtt_max_subscriptions: 8,
            mqtt_keepalive_s: 60,
            mqtt_connect_timeout_ms: 5_000,

            // BTLE
            btle_procedure_timeout_ms: 5_000,
            btle_reconnect_standoff_ms: 5_000,
            btle_max_subscriptions: 4,
        }
    }
}
