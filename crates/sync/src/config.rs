//! Subscriber and publisher configuration.
//!
//! Every default lives in a named constant. Durations are written to and
//! read from files as milliseconds.

#[cfg(test)]
#[path = "tests/config.rs"]
mod tests;

use core::time::Duration;
use std::fs::{read_to_string, write};

use camino::Utf8Path;
use dagsync_network::config::SwarmConfig;
use dagsync_primitives::common::{serde_duration, serde_duration_opt};
use eyre::{Result as EyreResult, WrapErr};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "dagsync.toml";

/// Default grace period for a publisher's serving tasks to stop (30 seconds)
pub const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 30;

/// Lower bound for the idle handler sweep interval (10 milliseconds)
pub const MIN_SWEEP_INTERVAL_MS: u64 = 10;

/// Default burst for a configured rate limit
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 1;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Handlers idle for longer than this are evicted. Unset keeps them forever.
    #[serde(
        rename = "idle_handler_ttl_ms",
        with = "serde_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub idle_handler_ttl: Option<Duration>,

    /// Depth limit of the default selector. Unset explores the whole DAG.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recursion_limit: Option<usize>,

    /// Per-publisher limit on remote block fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

impl SubscriberConfig {
    /// How often idle handlers are swept, if at all.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.idle_handler_ttl.map(|ttl| {
            ttl.checked_div(2)
                .unwrap_or_default()
                .max(Duration::from_millis(MIN_SWEEP_INTERVAL_MS))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Time to earn one token.
    #[serde(rename = "interval_ms", with = "serde_duration")]
    pub interval: Duration,

    #[serde(default = "default_burst")]
    pub burst: u32,
}

const fn default_burst() -> u32 {
    DEFAULT_RATE_LIMIT_BURST
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    #[serde(rename = "close_timeout_ms", with = "serde_duration")]
    pub close_timeout: Duration,

    /// Opaque bytes attached to every announce.
    pub extra_data: Vec<u8>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(DEFAULT_CLOSE_TIMEOUT_SECS),
            extra_data: Vec::new(),
        }
    }
}

/// On-disk configuration of a dagsync node.
#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct DagsyncConfig {
    /// Gossip topic announces are published on.
    pub topic: String,

    #[serde(default)]
    pub subscriber: SubscriberConfig,

    #[serde(default)]
    pub publisher: PublisherConfig,

    #[serde(default)]
    pub swarm: SwarmConfig,
}

impl DagsyncConfig {
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscriber: SubscriberConfig::default(),
            publisher: PublisherConfig::default(),
            swarm: SwarmConfig::default(),
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content).map_err(Into::into)
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }
}
