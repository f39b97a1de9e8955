//! Server Configuration
//!
//! Bind address of the HTTP control surface.

use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Server configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

impl ServerConfig {
    /// Apply CLI flags on top of the file/env values
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| WatchError::Config(format!("invalid bind address {}:{}: {}", self.host, self.port, e)))
    }
}
