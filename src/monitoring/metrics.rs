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

//! Prometheus metrics. `spec.md` §7 allows (without requiring) counting the
//! datagrams dropped at each validation step; this module is that counting.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric could not be constructed or registered.
    #[error("prometheus")]
    Prom,
}

/// Metrics container, exposed read-only via `GET /metrics`.
#[derive(Clone)]
pub struct Metrics {
    /// Registry backing the `/metrics` encoder.
    pub registry: Registry,

    /// Announcements successfully sent.
    pub announces_sent_total: IntCounter,
    /// Datagrams dropped for matching our own peer id (self-echo).
    pub announces_dropped_self_total: IntCounter,
    /// Datagrams dropped for failing signature verification.
    pub announces_dropped_verify_total: IntCounter,
    /// Datagrams dropped as a replay of a `(peer_id, nonce)` pair already seen.
    pub announces_dropped_replay_total: IntCounter,
    /// Datagrams dropped for falling outside the freshness window.
    pub announces_dropped_stale_total: IntCounter,
    /// Announcements accepted and handed to the bus.
    pub announces_accepted_total: IntCounter,

    /// Probe requests sent to a peer.
    pub probes_sent_total: IntCounter,
    /// Probes that received a reply before the deadline.
    pub probes_ok_total: IntCounter,
    /// Probes that timed out or errored.
    pub probes_failed_total: IntCounter,

    /// Current number of known peers.
    pub peers_gauge: IntGauge,
    /// Current number of tracked seen-cache entries.
    pub seen_cache_size: IntGauge,
    /// Probe workers currently mid-probe (worker-pool utilization).
    pub probe_workers_busy: IntGauge,
}

macro_rules! new_counter {
    ($name:literal, $help:literal) => {
        IntCounter::new($name, $help).map_err(|_| MetricsError::Prom)?
    };
}

macro_rules! new_gauge {
    ($name:literal, $help:literal) => {
        IntGauge::new($name, $help).map_err(|_| MetricsError::Prom)?
    };
}

impl Metrics {
    /// Create and register every metric against a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let announces_sent_total =
            new_counter!("lanpeerdiscoveryd_announces_sent_total", "Announcements sent");
        let announces_dropped_self_total = new_counter!(
            "lanpeerdiscoveryd_announces_dropped_self_total",
            "Datagrams dropped as a self-echo"
        );
        let announces_dropped_verify_total = new_counter!(
            "lanpeerdiscoveryd_announces_dropped_verify_total",
            "Datagrams dropped for failing signature verification"
        );
        let announces_dropped_replay_total = new_counter!(
            "lanpeerdiscoveryd_announces_dropped_replay_total",
            "Datagrams dropped as a replay"
        );
        let announces_dropped_stale_total = new_counter!(
            "lanpeerdiscoveryd_announces_dropped_stale_total",
            "Datagrams dropped for falling outside the freshness window"
        );
        let announces_accepted_total = new_counter!(
            "lanpeerdiscoveryd_announces_accepted_total",
            "Announcements accepted onto the bus"
        );

        let probes_sent_total =
            new_counter!("lanpeerdiscoveryd_probes_sent_total", "Probe requests sent");
        let probes_ok_total =
            new_counter!("lanpeerdiscoveryd_probes_ok_total", "Probes answered before the deadline");
        let probes_failed_total =
            new_counter!("lanpeerdiscoveryd_probes_failed_total", "Probes that timed out or errored");

        let peers_gauge = new_gauge!("lanpeerdiscoveryd_peers", "Current known peer count");
        let seen_cache_size =
            new_gauge!("lanpeerdiscoveryd_seen_cache_size", "Current seen-cache entry count");
        let probe_workers_busy = new_gauge!(
            "lanpeerdiscoveryd_probe_workers_busy",
            "Probe workers currently mid-probe"
        );

        for metric in [
            Box::new(announces_sent_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(announces_dropped_self_total.clone()),
            Box::new(announces_dropped_verify_total.clone()),
            Box::new(announces_dropped_replay_total.clone()),
            Box::new(announces_dropped_stale_total.clone()),
            Box::new(announces_accepted_total.clone()),
            Box::new(probes_sent_total.clone()),
            Box::new(probes_ok_total.clone()),
            Box::new(probes_failed_total.clone()),
            Box::new(peers_gauge.clone()),
            Box::new(seen_cache_size.clone()),
            Box::new(probe_workers_busy.clone()),
        ] {
            registry.register(metric).map_err(|_| MetricsError::Prom)?;
        }

        Ok(Self {
            registry,
            announces_sent_total,
            announces_dropped_self_total,
            announces_dropped_verify_total,
            announces_dropped_replay_total,
            announces_dropped_stale_total,
            announces_accepted_total,
            probes_sent_total,
            probes_ok_total,
            probes_failed_total,
            peers_gauge,
            seen_cache_size,
            probe_workers_busy,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
