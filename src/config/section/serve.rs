//! `[serve]` section configuration.
//!
//! Contains test server settings.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 9876                 # HTTP port number
//! watch = true                # Rebundle on file changes
//! ```
//!
//! Use `interface = "0.0.0.0"` to run the suite from another device on the LAN.

use std::net::{IpAddr, Ipv4Addr};

use serde::Deserialize;

/// Test server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// HTTP port number.
    pub port: u16,

    /// Watch the base path and rebundle on changes.
    pub watch: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 9876,
            watch: true,
        }
    }
}
