//! Typed, layered configuration (§3 "Configuration (added)", §4.11).
//!
//! Resolved once at startup: compiled-in defaults, then an optional TOML
//! file, then `AH_`-prefixed environment variables, then CLI flags — via the
//! `config` crate, the same layering mechanism the teacher's CLI leaves to
//! ad hoc `clap` defaults but which this agent needs because `own_prefix`
//! has no default and must come from *some* layer or fail fast.

use ah_common::name::Name;
use anyhow::{bail, Context, Result};
use config::{Config as RawConfig, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
struct RawValues {
    own_prefix: Option<String>,
    #[serde(default = "default_forwarder_port")]
    forwarder_port: u16,
    #[serde(default = "default_broadcast_prefix")]
    broadcast_prefix: String,
    #[serde(default = "default_control_socket_path")]
    control_socket_path: String,
    #[serde(default = "default_keepalive_interval_secs")]
    keepalive_interval_secs: u64,
    #[serde(default = "default_max_control_clients")]
    max_control_clients: usize,
    #[serde(default = "default_log_filter")]
    log_filter: String,
}

fn default_forwarder_port() -> u16 {
    6363
}
fn default_broadcast_prefix() -> String {
    "/localhop/ndn-autoconf/ah".to_string()
}
fn default_control_socket_path() -> String {
    "/tmp/ah".to_string()
}
fn default_keepalive_interval_secs() -> u64 {
    300
}
fn default_max_control_clients() -> usize {
    5
}
fn default_log_filter() -> String {
    "info".to_string()
}

/// Overrides supplied on the command line; each `Some` wins over the file
/// and environment layers beneath it.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub own_prefix: Option<String>,
    pub config_path: Option<PathBuf>,
    pub forwarder_port: Option<u16>,
    pub control_socket_path: Option<String>,
}

/// The agent's resolved configuration (§3).
#[derive(Debug, Clone)]
pub struct Config {
    pub own_prefix: Name,
    pub forwarder_port: u16,
    pub broadcast_prefix: Name,
    pub control_socket_path: PathBuf,
    pub keepalive_interval_secs: u64,
    pub max_control_clients: usize,
    pub log_filter: String,
}

impl Config {
    /// Loads and layers configuration: defaults < file < `AH_*` env < CLI.
    /// Any parse failure, or a missing `own_prefix` after all layers, is a
    /// fatal `Configuration` error (§7 kind 6) — this function's caller is
    /// expected to print the error and exit 1, never construct a partial
    /// agent.
    pub fn load(overrides: &CliOverrides) -> Result<Self> {
        let mut builder = RawConfig::builder();

        if let Some(path) = &overrides.config_path {
            builder = builder.add_source(File::from(path.as_path()).required(true));
        } else if let Some(default_path) = default_config_path() {
            builder = builder.add_source(File::from(default_path).required(false));
        }

        builder = builder.add_source(Environment::with_prefix("AH"));

        let raw: RawValues = builder
            .build()
            .context("loading layered configuration")?
            .try_deserialize()
            .context("parsing layered configuration")?;

        let own_prefix = overrides
            .own_prefix
            .clone()
            .or(raw.own_prefix)
            .ok_or_else(|| anyhow::anyhow!("own_prefix is required: pass it on the command line, in the config file, or via AH_OWN_PREFIX"))?;

        if own_prefix.is_empty() || !own_prefix.starts_with('/') {
            bail!("own_prefix must be a non-empty NDN name starting with '/', got {own_prefix:?}");
        }

        let forwarder_port = overrides.forwarder_port.unwrap_or(raw.forwarder_port);
        let control_socket_path = overrides
            .control_socket_path
            .clone()
            .unwrap_or(raw.control_socket_path);

        Ok(Self {
            own_prefix: Name::from_string(&own_prefix),
            forwarder_port,
            broadcast_prefix: Name::from_string(&raw.broadcast_prefix),
            control_socket_path: PathBuf::from(control_socket_path),
            keepalive_interval_secs: raw.keepalive_interval_secs,
            max_control_clients: raw.max_control_clients,
            log_filter: raw.log_filter,
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    let base = dirs_config_home()?;
    Some(base.join("ah-agent").join("config.toml"))
}

fn dirs_config_home() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_own_prefix_is_an_error() {
        let overrides = CliOverrides::default();
        // With no env vars and no file, own_prefix can't resolve.
        std::env::remove_var("AH_OWN_PREFIX");
        let result = Config::load(&overrides);
        assert!(result.is_err());
    }

    #[test]
    fn cli_override_wins_over_everything() {
        let overrides = CliOverrides {
            own_prefix: Some("/node-a".to_string()),
            forwarder_port: Some(7000),
            ..Default::default()
        };
        let cfg = Config::load(&overrides).unwrap();
        assert_eq!(cfg.own_prefix, Name::from_string("/node-a"));
        assert_eq!(cfg.forwarder_port, 7000);
        assert_eq!(cfg.max_control_clients, 5);
    }

    #[test]
    fn rejects_prefix_without_leading_slash() {
        let overrides = CliOverrides {
            own_prefix: Some("node-a".to_string()),
            ..Default::default()
        };
        assert!(Config::load(&overrides).is_err());
    }
}
