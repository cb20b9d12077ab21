//! Server configuration.
//!
//! Every field has a default, so a TOML file only needs the keys it changes.
//! Durations are whole seconds:
//!
//! ```toml
//! address = "127.0.0.1:3000"
//! read_timeout = 10
//! shutdown_timeout = 5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Listener address and the four server-enforced deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address [`Server::run`](crate::Server::run) binds, e.g. `"0.0.0.0:8080"`.
    pub address: String,

    /// Upper bound for receiving the request body. Expiry answers `408`.
    #[serde(with = "secs")]
    pub read_timeout: Duration,

    /// Upper bound for running the middleware chain. Expiry answers `503`.
    #[serde(with = "secs")]
    pub write_timeout: Duration,

    /// How long a kept-alive connection may wait for the next request head.
    #[serde(with = "secs")]
    pub idle_timeout: Duration,

    /// How long shutdown waits for in-flight connections before aborting them.
    #[serde(with = "secs")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_owned(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

mod secs {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
