//! Environment configuration.
//!
//! All settings come from environment variables with sensible defaults.
//! Validation happens once at startup; a bad value aborts the process
//! instead of surfacing as a broken request later.

use std::collections::HashSet;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

use crate::locate::{LocatorOptions, Strategy};

const DEFAULT_UPSTREAM_BASE_URL: &str = "http://status.vatsim.net";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_ALLOWED_IPS: &str = "127.0.0.1,::1";
const DEFAULT_STRATEGY: &str = "static-then-live";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{variable} must not be empty")]
    EmptyValue { variable: &'static str },

    #[error("{variable}: \"{value}\" is not a valid socket address")]
    InvalidBindAddress { variable: &'static str, value: String },

    #[error("{variable}: \"{value}\" is not a valid IP address")]
    InvalidAllowedIp { variable: &'static str, value: String },

    #[error("{variable}: unknown station locator strategy \"{value}\"")]
    UnknownStrategy { variable: &'static str, value: String },

    #[error("{variable}: \"{value}\" is not a boolean (use true/false)")]
    InvalidBoolean { variable: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL the upstream network information documents are fetched from.
    pub upstream_base_url: String,
    pub bind_address: SocketAddr,
    /// Base URL this gateway is reachable at, advertised to legacy clients.
    pub local_base_url: String,
    pub allowed_ips: HashSet<IpAddr>,
    pub strategy: Strategy,
    pub locator_options: LocatorOptions,
    pub vatspy_data_dir: Option<PathBuf>,
    pub alias_us_stations: bool,
    pub parser_log_enabled: bool,
    /// Serve the legacy data file as UTF-8 instead of ISO-8859-1. Some
    /// clients expect this against the original format definition.
    pub quirk_datafile_utf8: bool,
    pub transceivers_url_override: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let upstream_base_url = required(&lookup, "UPSTREAM_BASE_URL", DEFAULT_UPSTREAM_BASE_URL)?
            .trim_end_matches('/')
            .to_owned();
        let local_base_url = required(&lookup, "LOCAL_BASE_URL", DEFAULT_LOCAL_BASE_URL)?
            .trim_end_matches('/')
            .to_owned();

        let bind_value = required(&lookup, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS)?;
        let bind_address = bind_value
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress {
                variable: "BIND_ADDRESS",
                value: bind_value.clone(),
            })?;

        let mut allowed_ips = HashSet::new();
        for part in required(&lookup, "ALLOWED_IPS", DEFAULT_ALLOWED_IPS)?.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let ip = part.parse().map_err(|_| ConfigError::InvalidAllowedIp {
                variable: "ALLOWED_IPS",
                value: part.to_owned(),
            })?;
            allowed_ips.insert(ip);
        }
        if allowed_ips.is_empty() {
            return Err(ConfigError::EmptyValue {
                variable: "ALLOWED_IPS",
            });
        }

        let strategy_value = required(&lookup, "STATION_LOCATOR_STRATEGY", DEFAULT_STRATEGY)?;
        let strategy =
            Strategy::parse(&strategy_value).ok_or_else(|| ConfigError::UnknownStrategy {
                variable: "STATION_LOCATOR_STRATEGY",
                value: strategy_value,
            })?;

        let locator_options = LocatorOptions {
            locate_observer_by_static: boolean(&lookup, "LOCATE_OBSERVER_BY_STATIC", true)?,
            locate_observer_by_live: boolean(&lookup, "LOCATE_OBSERVER_BY_LIVE", false)?,
            assume_observer_by_callsign: boolean(&lookup, "ASSUME_OBSERVER_BY_CALLSIGN", true)?,
            ignore_placeholder_frequency: boolean(&lookup, "IGNORE_PLACEHOLDER_FREQUENCY", true)?,
            warn_unlocatable_atc: boolean(&lookup, "WARN_UNLOCATABLE_ATC", false)?,
            warn_unlocatable_observer: boolean(&lookup, "WARN_UNLOCATABLE_OBSERVER", false)?,
        };

        Ok(Self {
            upstream_base_url,
            bind_address,
            local_base_url,
            allowed_ips,
            strategy,
            locator_options,
            vatspy_data_dir: optional(&lookup, "VATSPY_DATA_DIR").map(PathBuf::from),
            alias_us_stations: boolean(&lookup, "ALIAS_US_STATIONS", true)?,
            parser_log_enabled: boolean(&lookup, "PARSER_LOG", false)?,
            quirk_datafile_utf8: boolean(&lookup, "QUIRK_DATAFILE_UTF8", false)?,
            transceivers_url_override: optional(&lookup, "TRANSCEIVERS_URL_OVERRIDE"),
        })
    }

    /// Configuration for tests and embedding, matching all defaults except
    /// for the values a caller almost always wants to control.
    pub fn for_testing() -> Self {
        let mut config =
            Self::from_lookup(|_| None).expect("defaults must produce a valid configuration");
        config.strategy = Strategy::Disabled;
        config
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<String, ConfigError> {
    match lookup(name) {
        None => Ok(default.to_owned()),
        Some(value) if value.trim().is_empty() => {
            Err(ConfigError::EmptyValue { variable: name })
        }
        Some(value) => Ok(value.trim().to_owned()),
    }
}

fn boolean(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(default);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean {
            variable: name,
            value,
        }),
    }
}
