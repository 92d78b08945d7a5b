// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Platform configuration for the messaging core.
//!
//! Configuration is loaded from three layers, lowest priority first:
//!   1. Built-in defaults (messaging disabled, local transport).
//!   2. Optional TOML file pointed to by the `SITEBUS_CONFIG_PATH`
//!      environment variable.
//!   3. `SITEBUS_*` environment variables (highest priority).
//!
//! Example:
//! ```toml
//! messaging_enabled = true
//! transport = "local"
//! node_id_override = "node-7"
//! ```

use std::fmt;
use std::str::FromStr;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::Result;

/// ENV used to set the path to the configuration file
const CONFIG_PATH_ENV: &str = "SITEBUS_CONFIG_PATH";

/// Prefix for configuration environment variables
const ENV_PREFIX: &str = "SITEBUS_";

/// Transport selection for the messaging receiver.
///
/// This determines which [`crate::transport::EventReceiver`] implementation
/// the bootstrap facade builds:
/// - `Local`: the in-process loopback transport shipped with this crate
/// - `Custom`: any other key, resolved against the builders registered in
///   the [`crate::transport::ReceiverFactory`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process loopback bus (default)
    Local,
    /// A transport registered under an arbitrary factory key
    #[serde(untagged)]
    Custom(String),
}

impl Default for TransportKind {
    fn default() -> Self {
        Self::Local
    }
}

impl TransportKind {
    /// The factory key this kind resolves under.
    pub fn as_key(&self) -> &str {
        match self {
            Self::Local => "local",
            Self::Custom(key) => key,
        }
    }

    /// Check if this kind is the in-process loopback transport
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

impl FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        match key.as_str() {
            "" => Err(anyhow::anyhow!("transport key must not be empty")),
            "local" => Ok(Self::Local),
            _ => Ok(Self::Custom(key)),
        }
    }
}

/// Platform-wide messaging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Whether cluster messaging is enabled at all. When false the bootstrap
    /// facade is a no-op and no sender or receiver is ever created.
    pub messaging_enabled: bool,
    /// Which receiver implementation to build.
    pub transport: TransportKind,
    /// Explicit node identity. When absent the node id falls back to the
    /// `SITEBUS_NODE_ID` environment variable and then the local hostname.
    pub node_id_override: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            messaging_enabled: false,
            transport: TransportKind::Local,
            node_id_override: None,
        }
    }
}

impl PlatformConfig {
    /// Load configuration from defaults, the optional TOML file, and
    /// `SITEBUS_*` environment variables.
    pub fn from_settings() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            figment = figment.merge(Toml::file(path));
        }
        let config = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        Ok(config)
    }

    /// A config with messaging enabled on the given transport. Used by
    /// embedding code and tests that do not read ambient settings.
    pub fn enabled(transport: TransportKind) -> Self {
        Self {
            messaging_enabled: true,
            transport,
            node_id_override: None,
        }
    }
}
