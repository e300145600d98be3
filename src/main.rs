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

//! lanpeerdiscoveryd entrypoint.

use lanpeerdiscoveryd::config::Config;
use lanpeerdiscoveryd::core::bus::new_bus;
use lanpeerdiscoveryd::core::table::{self, Table, TableConfig};
use lanpeerdiscoveryd::monitoring::metrics::Metrics;
use lanpeerdiscoveryd::networking::{announcer, listener, netx, probe, seen_cache::SeenCache, workers};
use lanpeerdiscoveryd::server::http;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "configuration error");
            std::process::exit(1);
        }
    };

    let rng = SystemRandom::new();
    let keypair = match Ed25519KeyPair::generate_pkcs8(&rng)
        .map_err(|_| ())
        .and_then(|pkcs8| Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| ()))
    {
        Ok(kp) => kp,
        Err(()) => {
            error!("failed to generate process keypair; random source unavailable");
            std::process::exit(1);
        }
    };
    let self_id = hex::encode(keypair.public_key().as_ref());

    let interfaces = match netx::eligible() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            error!(%err, "no eligible broadcast interfaces");
            std::process::exit(1);
        }
    };

    info!(self_id = %self_id, peers = interfaces.len(), "starting lanpeerdiscoveryd");

    let metrics = Arc::new(Metrics::new().expect("metrics registration"));
    let (bus_tx, bus_rx, probe_tx, probe_request_rx) = new_bus();
    let cancel = CancellationToken::new();
    let seen = Arc::new(SeenCache::new());

    let mut handles = Vec::new();

    let table_cfg = TableConfig {
        stale_after: cfg.stale_after,
        down_after: cfg.down_after,
        evict_after: cfg.evict_after,
        probe_every: cfg.probe_every,
        maintenance_every: Duration::from_secs(1),
    };
    {
        let metrics = metrics.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            table::run(Table::new(), bus_rx, probe_tx, metrics, table_cfg, SystemTime::now, cancel).await;
        }));
    }

    {
        let seen = seen.clone();
        let bus_tx = bus_tx.clone();
        let metrics = metrics.clone();
        let self_id = self_id.clone();
        let announce_port = cfg.announce_port;
        let evict_after = cfg.evict_after;
        let freshness_window = cfg.freshness_window;
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) = listener::run(
                announce_port,
                self_id,
                seen,
                bus_tx,
                metrics,
                evict_after,
                freshness_window,
                cancel,
            )
            .await
            {
                error!(%err, "listener exited");
            }
        }));
    }

    {
        let host_name = cfg.host_name.clone();
        let probe_port = cfg.probe_port;
        let announce_port = cfg.announce_port;
        let announce_interval = cfg.announce_interval;
        let metrics = metrics.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) = announcer::run(
                interfaces,
                host_name,
                probe_port,
                announce_port,
                announce_interval,
                keypair,
                metrics,
                cancel,
            )
            .await
            {
                error!(%err, "announcer exited fatally");
                std::process::exit(1);
            }
        }));
    }

    handles.extend(workers::spawn_pool(
        cfg.probe_workers,
        probe_request_rx,
        bus_tx.clone(),
        metrics.clone(),
        cancel.clone(),
    ));

    {
        let probe_port = cfg.probe_port;
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) = probe::run_echo_server(probe_port, cancel).await {
                error!(%err, "echo server exited");
            }
        }));
    }

    {
        let seen = seen.clone();
        let cleanup_every = cfg.seen_cleanup_every;
        let metrics = metrics.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(cleanup_every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {
                        let removed = seen.cleanup(std::time::Instant::now());
                        metrics.seen_cache_size.set(seen.len() as i64);
                        if removed > 0 {
                            info!(removed, "seen-cache cleanup");
                        }
                    }
                }
            }
        }));
    }

    {
        let http_port = cfg.http_port;
        let bus_tx = bus_tx.clone();
        let metrics = metrics.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) = http::run(http_port, bus_tx, metrics, cancel).await {
                error!(%err, "http server exited");
            }
        }));
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            cancel.cancel();
        });
    }

    for handle in handles {
        let _ = handle.await;
    }
    info!("exited cleanly");
}
