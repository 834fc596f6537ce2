// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for vault records, audit log and registry | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `BOOTSTRAP_MEK` | 64 hex chars; boots unsealed when set | unset |
//! | `CEREMONY_TTL_SECS` | Default ceremony lifetime | `3600` |
//! | `CEREMONY_SWEEP_SECS` | Expiry sweeper interval | `30` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::SecretKey;
use crate::vault::paths::DATA_ROOT;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
/// Never logged.
pub const BOOTSTRAP_MEK_ENV: &str = "BOOTSTRAP_MEK";
pub const CEREMONY_TTL_ENV: &str = "CEREMONY_TTL_SECS";
pub const CEREMONY_SWEEP_ENV: &str = "CEREMONY_SWEEP_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CEREMONY_TTL_SECS: u64 = 3600;
pub const DEFAULT_CEREMONY_SWEEP_SECS: u64 = 30;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    /// The bootstrap key is malformed. The value itself is never included.
    #[error("BOOTSTRAP_MEK must be 64 hex characters")]
    InvalidBootstrapKey,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Startup configuration.
pub struct CustodyConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub ceremony_ttl: Duration,
    pub sweep_interval: Duration,
    pub log_format: LogFormat,
    bootstrap_mek: Option<SecretKey>,
}

impl fmt::Debug for CustodyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustodyConfig")
            .field("data_dir", &self.data_dir)
            .field("bind_addr", &self.bind_addr)
            .field("ceremony_ttl", &self.ceremony_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("log_format", &self.log_format)
            .field("bootstrap_mek", &self.bootstrap_mek.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CustodyConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string()));

        let host: IpAddr = get(HOST_ENV)
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
            .trim()
            .parse()
            .map_err(|e| invalid(HOST_ENV, e))?;
        let port = parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT)?;

        let ttl_secs = parse_or(get(CEREMONY_TTL_ENV), CEREMONY_TTL_ENV, DEFAULT_CEREMONY_TTL_SECS)?;
        let sweep_secs = parse_or(
            get(CEREMONY_SWEEP_ENV),
            CEREMONY_SWEEP_ENV,
            DEFAULT_CEREMONY_SWEEP_SECS,
        )?;
        if ttl_secs == 0 {
            return Err(invalid(CEREMONY_TTL_ENV, "must be positive"));
        }
        if sweep_secs == 0 {
            return Err(invalid(CEREMONY_SWEEP_ENV, "must be positive"));
        }

        let log_format = match get(LOG_FORMAT_ENV).as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let bootstrap_mek = match lookup(BOOTSTRAP_MEK_ENV) {
            Some(hex) if !hex.trim().is_empty() => Some(
                SecretKey::from_hex(hex.trim()).map_err(|_| ConfigError::InvalidBootstrapKey)?,
            ),
            _ => None,
        };

        Ok(Self {
            data_dir,
            bind_addr: SocketAddr::new(host, port),
            ceremony_ttl: Duration::from_secs(ttl_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
            log_format,
            bootstrap_mek,
        })
    }

    pub fn has_bootstrap_mek(&self) -> bool {
        self.bootstrap_mek.is_some()
    }

    /// Hand the bootstrap key to its single consumer.
    pub fn take_bootstrap_mek(&mut self) -> Option<SecretKey> {
        self.bootstrap_mek.take()
    }

    pub fn ceremony_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ceremony_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_CEREMONY_TTL_SECS as i64))
    }
}

fn parse_or<T>(value: Option<String>, name: &'static str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e| invalid(name, e)),
        None => Ok(default),
    }
}

fn invalid(name: &'static str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}
