// Copyright (c) 2026 the lanpeerdiscoveryd authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Runtime configuration, loaded once from the environment at startup.
//! `HTTP_PORT` is the only required variable (`spec.md` §6); every other
//! variable overrides a default that reproduces `spec.md`'s literal
//! constants exactly.

use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration errors, all fatal at startup (`spec.md` §7).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `HTTP_PORT` is unset or not a valid port number.
    #[error("HTTP_PORT is required and must be a valid port number")]
    MissingHttpPort,
}

/// Runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Advertised `name` field in announcements (`HOST_NAME`).
    pub host_name: String,
    /// HTTP listen port (`HTTP_PORT`, required).
    pub http_port: u16,
    /// UDP announce broadcast/listen port.
    pub announce_port: u16,
    /// UDP probe (echo) port.
    pub probe_port: u16,
    /// Cadence at which the announcer re-broadcasts.
    pub announce_interval: Duration,
    /// Age past which a `Healthy` peer becomes `Suspect`.
    pub stale_after: Duration,
    /// Age past which a peer becomes `Down`.
    pub down_after: Duration,
    /// Age past which a peer is evicted.
    pub evict_after: Duration,
    /// Cadence of the table's probe tick.
    pub probe_every: Duration,
    /// Symmetric window around `epoch_ms` outside which a datagram is stale.
    pub freshness_window: Duration,
    /// Cadence of the seen-cache cleanup sweep.
    pub seen_cleanup_every: Duration,
    /// Number of probe workers in the pool.
    pub probe_workers: usize,
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(key, raw, "invalid duration override; using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<u16>() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, raw, "invalid port override; using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<usize>() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, raw, "invalid override; using default");
                default
            }
        },
        Err(_) => default,
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_port = std::env::var("HTTP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .ok_or(ConfigError::MissingHttpPort)?;

        Ok(Self {
            host_name: std::env::var("HOST_NAME").unwrap_or_default(),
            http_port,
            announce_port: env_u16("ANNOUNCE_PORT", 8291),
            probe_port: env_u16("PROBE_PORT", 9125),
            announce_interval: env_duration_ms("ANNOUNCE_INTERVAL_MS", Duration::from_millis(2000)),
            stale_after: env_duration_ms("STALE_AFTER_MS", Duration::from_millis(5000)),
            down_after: env_duration_ms("DOWN_AFTER_MS", Duration::from_millis(10000)),
            evict_after: env_duration_ms("EVICT_AFTER_MS", Duration::from_millis(20000)),
            probe_every: env_duration_ms("PROBE_EVERY_MS", Duration::from_millis(1000)),
            freshness_window: env_duration_ms("FRESHNESS_WINDOW_MS", Duration::from_millis(10000)),
            seen_cleanup_every: env_duration_ms("SEEN_CLEANUP_MS", Duration::from_millis(45000)),
            probe_workers: env_usize("PROBE_WORKERS", 5),
        })
    }
}
