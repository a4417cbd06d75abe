//! Configuration for spacekv clients
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::schema::Schema;

/// Main configuration for a client instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Server address (host:port) used by `Client::connect`
    pub addr: String,

    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Socket write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    /// Size of each socket read while polling (bytes)
    pub read_buffer_size: usize,

    /// Largest frame payload accepted from the wire (bytes)
    pub max_payload_size: u32,

    // -------------------------------------------------------------------------
    // Dispatch Configuration
    // -------------------------------------------------------------------------
    /// Default deadline applied to `wait()` and search iteration.
    /// `None` blocks until the transport delivers a response.
    pub wait_timeout_ms: Option<u64>,

    // -------------------------------------------------------------------------
    // Schema Configuration
    // -------------------------------------------------------------------------
    /// Spaces known up front; others are looked up through the transport
    pub spaces: Vec<Schema>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:1982".to_string(),
            connect_timeout_ms: 5000,
            write_timeout_ms: 5000,
            read_buffer_size: 64 * 1024, // 64 KB
            max_payload_size: 16 * 1024 * 1024, // 16 MB
            wait_timeout_ms: None,
            spaces: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Default wait deadline as a `Duration`
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the server address
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the per-read buffer size (in bytes)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the largest accepted frame payload (in bytes)
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the default wait deadline (in milliseconds)
    pub fn wait_timeout_ms(mut self, ms: u64) -> Self {
        self.config.wait_timeout_ms = Some(ms);
        self
    }

    /// Register a space schema up front
    pub fn space(mut self, schema: Schema) -> Self {
        self.config.spaces.push(schema);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
