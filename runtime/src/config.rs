//! Configuration management for the ticket flow runtime.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator configuration
    pub flow: FlowConfig,
    /// In-memory gateway configuration
    pub gateway: GatewayConfig,
    /// Log filter (trace, debug, info, warn, error or an `EnvFilter` directive)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flow: FlowConfig::default(),
            gateway: GatewayConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Capacity of the command channel feeding the coordinator task
    pub command_buffer: usize,
    /// Capacity of the toast broadcast channel
    pub toast_capacity: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            command_buffer: 32,
            toast_capacity: 64,
        }
    }
}

/// In-memory gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Simulated latency of every call in milliseconds
    pub latency_ms: u64,
    /// Lifetime of a hold in seconds
    pub hold_ttl_secs: u64,
    /// Probability (0.0 to 1.0) that a reserve call fails with a network error
    pub failure_rate: f64,
    /// Seats available per ticket before any hold
    pub initial_inventory: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            latency_ms: 50,
            hold_ttl_secs: 300,
            failure_rate: 0.0,
            initial_inventory: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let flow = FlowConfig::default();
        let gateway = GatewayConfig::default();

        Self {
            flow: FlowConfig {
                command_buffer: env::var("TICKET_FLOW_COMMAND_BUFFER")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(flow.command_buffer),
                toast_capacity: env::var("TICKET_FLOW_TOAST_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(flow.toast_capacity),
            },
            gateway: GatewayConfig {
                latency_ms: env::var("GATEWAY_LATENCY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(gateway.latency_ms),
                hold_ttl_secs: env::var("GATEWAY_HOLD_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(gateway.hold_ttl_secs),
                failure_rate: env::var("GATEWAY_FAILURE_RATE")
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .filter(|rate| (0.0..=1.0).contains(rate))
                    .unwrap_or(gateway.failure_rate),
                initial_inventory: env::var("GATEWAY_INITIAL_INVENTORY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(gateway.initial_inventory),
            },
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
