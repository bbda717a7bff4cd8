use serde::Deserialize;
use std::{fs, path::Path, time::Duration};
use anyhow::{bail, Context, Result};

use crate::validate::{FeeRateBounds, DEFAULT_MAX_FEE_RATE, DEFAULT_MIN_FEE_RATE};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub send: SendForm,
    #[serde(default)]
    pub refresh: Refresh,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub log: Log,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SendForm {
    #[serde(default = "default_min_fee_rate")]
    pub min_fee_rate: u64,
    #[serde(default = "default_max_fee_rate")]
    pub max_fee_rate: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Refresh {
    #[serde(default = "default_min_visible_ms")]
    pub min_visible_ms: u64,
    /// Kick off a refresh once a broadcast succeeds.
    #[serde(default = "default_true")]
    pub after_broadcast: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Engine {
    #[serde(default = "default_starting_balance")]
    pub starting_balance_sats: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metrics {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_min_fee_rate() -> u64   { DEFAULT_MIN_FEE_RATE }
fn default_max_fee_rate() -> u64   { DEFAULT_MAX_FEE_RATE }
fn default_min_visible_ms() -> u64 { 300 }
fn default_true() -> bool          { true }
fn default_starting_balance() -> u64 { 100_000 }
fn default_bind() -> String        { "127.0.0.1:9100".into() }
fn default_level() -> String       { "info".into() }

impl Default for SendForm {
    fn default() -> Self {
        Self { min_fee_rate: default_min_fee_rate(), max_fee_rate: default_max_fee_rate() }
    }
}

impl Default for Refresh {
    fn default() -> Self {
        Self { min_visible_ms: default_min_visible_ms(), after_broadcast: true }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self { starting_balance_sats: default_starting_balance() }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self { enabled: false, bind: default_bind() }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

impl SendForm {
    pub fn fee_rate_bounds(&self) -> FeeRateBounds {
        FeeRateBounds { min: self.min_fee_rate, max: self.max_fee_rate }
    }
}

impl Refresh {
    pub fn min_visible(&self) -> Duration {
        Duration::from_millis(self.min_visible_ms)
    }
}

impl Config {
    fn check(self) -> Result<Self> {
        if self.send.min_fee_rate == 0 {
            bail!("send.min_fee_rate must be at least 1");
        }
        if self.send.min_fee_rate > self.send.max_fee_rate {
            bail!(
                "send.min_fee_rate ({}) exceeds send.max_fee_rate ({})",
                self.send.min_fee_rate,
                self.send.max_fee_rate
            );
        }
        Ok(self)
    }
}

/// Read the TOML file at `p` and deserialize into `Config`.
/// *Adds context* so user errors print a friendlier message.
///
/// # Errors
/// * Returns an anyhow::Error if the file cannot be read, parsed, or holds an empty fee range.
pub fn load<P: AsRef<Path>>(p: P) -> Result<Config> {
    let text = fs::read_to_string(&p)
        .with_context(|| format!("🗂️  couldn’t read config file {}", p.as_ref().display()))?;
    load_from_str(&text)
}

pub fn load_from_str(text: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(text)
        .with_context(|| "📝  invalid TOML in config file".to_string())?;
    cfg.check()
}
