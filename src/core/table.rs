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

//! The table: the single-owner state machine that owns the peer map (I1).
//! Every mutation is one of the five reactions below; no other code in this
//! crate ever touches a `Peer` directly.

use crate::core::bus::{
    AnnounceEvent, BusReceiver, PeerListSnapshot, ProbeRequestSender, ProbeResponse,
};
use crate::core::types::{Peer, Status};
use crate::monitoring::metrics::Metrics;
use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Aging and cadence thresholds.
#[derive(Clone, Copy, Debug)]
pub struct TableConfig {
    /// Age past which a `Healthy` peer becomes `Suspect`.
    pub stale_after: Duration,
    /// Age past which a peer becomes `Down` and is no longer probed.
    pub down_after: Duration,
    /// Age past which a peer is evicted entirely.
    pub evict_after: Duration,
    /// Cadence of the probe tick.
    pub probe_every: Duration,
    /// Cadence of the maintenance tick. `spec.md` fixes this at 1s.
    pub maintenance_every: Duration,
}

/// The peer map. Pure, synchronous mutators live here so the aging and event
/// semantics (I2-I5, P5-P7) can be tested without spinning up the async loop.
#[derive(Default)]
pub struct Table {
    peers: HashMap<String, Peer>,
}

impl Table {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Current peer count.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True if no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Look up a peer by id (test/inspection only).
    pub fn get(&self, id: &str) -> Option<&Peer> {
        self.peers.get(id)
    }

    /// Apply an announce event: create the peer if unknown, else refresh its
    /// address and `last_seen`.
    pub fn apply_announce(&mut self, event: &AnnounceEvent, now: SystemTime) {
        match self.peers.get_mut(&event.id) {
            Some(peer) => {
                peer.address = event.address;
                peer.last_seen = now;
            }
            None => {
                self.peers
                    .insert(event.id.clone(), Peer::new(event.id.clone(), event.address, now));
            }
        }
    }

    /// Apply a probe response: update `last_probe` always; on success, reset
    /// to `Healthy` and fold the RTT into the EWMA (I3, I4, P5). A failed
    /// probe never changes status directly (status decay is age-driven only).
    pub fn apply_probe_response(&mut self, response: &ProbeResponse) {
        let Some(peer) = self.peers.get_mut(&response.id) else {
            return;
        };
        peer.last_probe = Some(response.when);
        if response.ok {
            peer.status = Status::Healthy;
            let rtt_ms = response.rtt.as_secs_f64() * 1000.0;
            peer.rtt_ms = 0.8 * peer.rtt_ms + 0.2 * rtt_ms;
        }
    }

    /// Peers eligible for a probe on this tick: not yet `Down` by age.
    pub fn probe_tick_targets(&self, now: SystemTime, down_after: Duration) -> Vec<(String, SocketAddrV4)> {
        self.peers
            .values()
            .filter(|p| age(p.last_seen, now) <= down_after)
            .map(|p| (p.id.clone(), p.address))
            .collect()
    }

    /// Maintenance tick: age-driven transitions, exactly one per peer per
    /// tick, evaluated in eviction > down > stale order so the first
    /// matching case wins (P6).
    pub fn maintenance_tick(&mut self, now: SystemTime, cfg: &TableConfig) -> MaintenanceOutcome {
        let mut outcome = MaintenanceOutcome::default();
        self.peers.retain(|_, peer| {
            let age = age(peer.last_seen, now);
            if age > cfg.evict_after {
                outcome.evicted += 1;
                return false;
            }
            if age > cfg.down_after {
                if peer.status != Status::Down {
                    outcome.downed += 1;
                }
                peer.status = Status::Down;
            } else if age > cfg.stale_after && peer.status == Status::Healthy {
                peer.status = Status::Suspect;
                outcome.suspected += 1;
            }
            true
        });
        outcome
    }

    /// Build a read snapshot for the HTTP shim.
    pub fn snapshot(&self, now: SystemTime) -> PeerListSnapshot {
        PeerListSnapshot::new(now, self.peers.values())
    }
}

fn age(last_seen: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(last_seen).unwrap_or(Duration::ZERO)
}

/// Counts of transitions applied by one maintenance tick, used for logging.
#[derive(Default, Debug, Clone, Copy)]
pub struct MaintenanceOutcome {
    /// Peers removed entirely.
    pub evicted: usize,
    /// Peers that transitioned into `Down`.
    pub downed: usize,
    /// Peers that transitioned into `Suspect`.
    pub suspected: usize,
}

/// Run the table's executor: the only task that ever mutates the peer map
/// (I1). Returns when `cancel` fires.
pub async fn run(
    mut table: Table,
    mut bus: BusReceiver,
    probes: ProbeRequestSender,
    metrics: Arc<Metrics>,
    cfg: TableConfig,
    now: impl Fn() -> SystemTime,
    cancel: CancellationToken,
) {
    let mut probe_tick = tokio::time::interval(cfg.probe_every);
    let mut maintenance_tick = tokio::time::interval(cfg.maintenance_every);
    probe_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    maintenance_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("table loop cancelled");
                return;
            }

            Some(event) = bus.announce_rx.recv() => {
                table.apply_announce(&event, now());
                metrics.peers_gauge.set(table.len() as i64);
            }

            Some(response) = bus.probe_response_rx.recv() => {
                if response.ok {
                    metrics.probes_ok_total.inc();
                } else {
                    metrics.probes_failed_total.inc();
                }
                table.apply_probe_response(&response);
            }

            _ = probe_tick.tick() => {
                for (id, address) in table.probe_tick_targets(now(), cfg.down_after) {
                    let request = crate::core::bus::ProbeRequest { id, address };
                    // The probe channel is drained by a bounded worker pool;
                    // a full channel is intentional backpressure (spec.md §4.6),
                    // so this blocks rather than drops.
                    if probes.probe_request_tx.send(request).await.is_ok() {
                        metrics.probes_sent_total.inc();
                    }
                }
            }

            _ = maintenance_tick.tick() => {
                let outcome = table.maintenance_tick(now(), &cfg);
                if outcome.evicted > 0 || outcome.downed > 0 || outcome.suspected > 0 {
                    debug!(?outcome, "maintenance tick");
                }
                metrics.peers_gauge.set(table.len() as i64);
            }

            Some(request) = bus.list_peers_rx.recv() => {
                let snapshot = table.snapshot(now());
                let _ = request.reply.send(snapshot);
            }

            else => {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 2), port)
    }

    fn cfg() -> TableConfig {
        TableConfig {
            stale_after: Duration::from_millis(5000),
            down_after: Duration::from_millis(10000),
            evict_after: Duration::from_millis(20000),
            probe_every: Duration::from_millis(1000),
            maintenance_every: Duration::from_millis(1000),
        }
    }

    fn at_secs(s: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(s)
    }

    fn at_millis(ms: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(ms)
    }

    #[test]
    fn scenario_1_create_on_announce() {
        let mut table = Table::new();
        table.apply_announce(
            &AnnounceEvent { id: "aa".into(), address: addr(9125) },
            at_secs(1000),
        );
        let peer = table.get("aa").expect("peer exists");
        assert_eq!(peer.status, Status::Unknown);
        assert_eq!(peer.last_seen, at_secs(1000));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn scenario_2_heal_via_probe() {
        let mut table = Table::new();
        table.apply_announce(&AnnounceEvent { id: "aa".into(), address: addr(9125) }, at_secs(1000));
        table.apply_probe_response(&ProbeResponse {
            id: "aa".into(),
            ok: true,
            rtt: Duration::from_millis(50),
            when: at_secs(1001),
        });
        let peer = table.get("aa").unwrap();
        assert_eq!(peer.status, Status::Healthy);
        assert!((peer.rtt_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_3_aging_to_suspect_down_evicted() {
        let mut table = Table::new();
        table.apply_announce(&AnnounceEvent { id: "aa".into(), address: addr(9125) }, at_secs(1000));
        table.apply_probe_response(&ProbeResponse {
            id: "aa".into(),
            ok: true,
            rtt: Duration::from_millis(50),
            when: at_secs(1001),
        });

        let c = cfg();
        let base_ms = 1001 * 1000;

        let o = table.maintenance_tick(at_millis(base_ms + 5001), &c);
        assert_eq!(o.suspected, 1);
        assert_eq!(table.get("aa").unwrap().status, Status::Suspect);

        let o = table.maintenance_tick(at_millis(base_ms + 10001), &c);
        assert_eq!(o.downed, 1);
        assert_eq!(table.get("aa").unwrap().status, Status::Down);

        let o = table.maintenance_tick(at_millis(base_ms + 20001), &c);
        assert_eq!(o.evicted, 1);
        assert!(table.get("aa").is_none());
    }

    #[test]
    fn scenario_6_down_peer_excluded_from_probe_tick() {
        let mut table = Table::new();
        table.apply_announce(&AnnounceEvent { id: "aa".into(), address: addr(9125) }, at_secs(1000));
        let c = cfg();
        table.maintenance_tick(at_secs(1000) + c.down_after + Duration::from_millis(1), &c);
        assert_eq!(table.get("aa").unwrap().status, Status::Down);
        let targets = table.probe_tick_targets(
            at_secs(1000) + c.down_after + Duration::from_millis(1),
            c.down_after,
        );
        assert!(targets.is_empty());
    }

    #[test]
    fn failed_probe_does_not_change_status_or_rtt() {
        let mut table = Table::new();
        table.apply_announce(&AnnounceEvent { id: "aa".into(), address: addr(9125) }, at_secs(1000));
        table.apply_probe_response(&ProbeResponse {
            id: "aa".into(),
            ok: false,
            rtt: Duration::ZERO,
            when: at_secs(1001),
        });
        let peer = table.get("aa").unwrap();
        assert_eq!(peer.status, Status::Unknown);
        assert_eq!(peer.rtt_ms, 0.0);
        assert_eq!(peer.last_probe, Some(at_secs(1001)));
    }

    #[test]
    fn probe_response_for_unknown_peer_is_ignored() {
        let mut table = Table::new();
        table.apply_probe_response(&ProbeResponse {
            id: "ghost".into(),
            ok: true,
            rtt: Duration::from_millis(1),
            when: at_secs(1),
        });
        assert!(table.is_empty());
    }

    #[test]
    fn ewma_recurrence_matches_sequence() {
        let mut table = Table::new();
        table.apply_announce(&AnnounceEvent { id: "aa".into(), address: addr(9125) }, at_secs(0));
        let samples = [50.0_f64, 10.0, 200.0, 5.0];
        let mut expected = 0.0_f64;
        for (i, &r) in samples.iter().enumerate() {
            table.apply_probe_response(&ProbeResponse {
                id: "aa".into(),
                ok: true,
                rtt: Duration::from_secs_f64(r / 1000.0),
                when: at_secs(i as u64),
            });
            expected = 0.8 * expected + 0.2 * r;
        }
        assert!((table.get("aa").unwrap().rtt_ms - expected).abs() < 1e-6);
    }

    #[test]
    fn suspect_and_down_peers_heal_to_healthy_on_success() {
        let mut table = Table::new();
        table.apply_announce(&AnnounceEvent { id: "aa".into(), address: addr(9125) }, at_secs(0));
        let c = cfg();
        table.maintenance_tick(at_secs(0) + c.down_after + Duration::from_secs(1), &c);
        assert_eq!(table.get("aa").unwrap().status, Status::Down);
        table.apply_probe_response(&ProbeResponse {
            id: "aa".into(),
            ok: true,
            rtt: Duration::from_millis(1),
            when: at_secs(100),
        });
        assert_eq!(table.get("aa").unwrap().status, Status::Healthy);
    }
}
