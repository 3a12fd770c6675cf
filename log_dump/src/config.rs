//! `log_dump.toml`: what to print and how to log while doing it.
//!
//! Every table and key is optional; a missing file behaves like an empty
//! one. Command line flags are applied on top in `main`.

use std::{fs, path::Path};

use anyhow::Context;
use log::LevelFilter;
use serde::Deserialize;
use shared::Guid;
use shared::status;
use shared::wire::{EntryHeader, OperationKind};
use thiserror::Error;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "INFO".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.to_uppercase().as_str() {
            "OFF" => LevelFilter::Off,
            "ERROR" => LevelFilter::Error,
            "WARN" => LevelFilter::Warn,
            "DEBUG" => LevelFilter::Debug,
            "TRACE" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }
}

/// Mirror of the `[filter]` table, still as strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub kinds: Vec<String>,
    pub vendor: Option<String>,
    pub failed_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: Format,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown operation kind `{0}`, expected `get` or `set`")]
    UnknownKind(String),
    #[error("malformed vendor GUID `{0}`")]
    BadGuid(String),
}

pub fn load(path: &Path) -> anyhow::Result<Config> {
    let txt = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cfg = toml::from_str(&txt).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

pub fn parse_kind(text: &str) -> Result<OperationKind, ConfigError> {
    match text.to_ascii_lowercase().as_str() {
        "g" | "get" | "getvariable" => Ok(OperationKind::Get),
        "s" | "set" | "setvariable" => Ok(OperationKind::Set),
        _ => Err(ConfigError::UnknownKind(text.to_owned())),
    }
}

/// `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, braces optional.
pub fn parse_guid(text: &str) -> Result<Guid, ConfigError> {
    let bad = || ConfigError::BadGuid(text.to_owned());
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('{').and_then(|t| t.strip_suffix('}')).unwrap_or(trimmed);

    let parts: Vec<&str> = trimmed.split('-').collect();
    let [d1, d2, d3, d4, d5] = parts.as_slice() else {
        return Err(bad());
    };
    let widths = [(d1, 8), (d2, 4), (d3, 4), (d4, 4), (d5, 12)];
    if widths.iter().any(|(p, w)| p.len() != *w || !p.bytes().all(|b| b.is_ascii_hexdigit())) {
        return Err(bad());
    }

    let data1 = u32::from_str_radix(d1, 16).map_err(|_| bad())?;
    let data2 = u16::from_str_radix(d2, 16).map_err(|_| bad())?;
    let data3 = u16::from_str_radix(d3, 16).map_err(|_| bad())?;
    let tail = hex::decode(format!("{d4}{d5}")).map_err(|_| bad())?;
    let data4: [u8; 8] = tail.try_into().map_err(|_| bad())?;
    Ok(Guid::from_fields(data1, data2, data3, data4))
}

/// Which entries get printed. Empty `kinds` means all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub kinds: Vec<OperationKind>,
    pub vendor: Option<Guid>,
    pub failed_only: bool,
}

impl Filter {
    pub fn from_config(cfg: &FilterConfig) -> Result<Self, ConfigError> {
        let kinds = cfg.kinds.iter().map(|k| parse_kind(k)).collect::<Result<_, _>>()?;
        let vendor = cfg.vendor.as_deref().map(parse_guid).transpose()?;
        Ok(Self { kinds, vendor, failed_only: cfg.failed_only })
    }

    pub fn matches(&self, header: &EntryHeader) -> bool {
        let kind = self.kinds.is_empty() || header.kind().is_some_and(|k| self.kinds.contains(&k));
        let vendor = self.vendor.is_none_or(|v| v == header.vendor);
        let outcome = !self.failed_only || status::is_error(header.status);
        kind && vendor && outcome
    }
}
