//! Configuration loading from `.env` files.

use std::{env, time::Duration};

use anyhow::{Context, Result};

/// Store clearing interval used when `EVICT_INTERVAL_MS` is unset.
pub const DEFAULT_EVICT_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP bind address for health and relay info, e.g. `127.0.0.1:7777`.
    pub bind_http: String,
    /// WebSocket bind address, e.g. `127.0.0.1:7778`.
    pub bind_ws: String,
    /// How often the whole event store is dropped.
    pub evict_interval: Duration,
    /// Name advertised in the NIP-11 document.
    pub relay_name: String,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let bind_http = env::var("BIND_HTTP").context("BIND_HTTP")?;
        let bind_ws = env::var("BIND_WS").context("BIND_WS")?;
        let evict_ms = match env::var("EVICT_INTERVAL_MS") {
            Ok(v) if !v.trim().is_empty() => v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("EVICT_INTERVAL_MS={v}"))?,
            _ => DEFAULT_EVICT_INTERVAL_MS,
        };
        anyhow::ensure!(evict_ms > 0, "EVICT_INTERVAL_MS must be positive");
        let relay_name = env::var("RELAY_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "commons-relay".into());
        Ok(Self {
            bind_http,
            bind_ws,
            evict_interval: Duration::from_millis(evict_ms),
            relay_name,
        })
    }
}
