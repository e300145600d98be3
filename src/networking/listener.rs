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

//! The listener (C4): receives announce datagrams, runs the validation
//! pipeline (decode, self-check, verify, replay, freshness), and submits
//! accepted announcements to the bus.

use crate::core::bus::{AnnounceEvent, BusSender};
use crate::core::wire;
use crate::monitoring::metrics::Metrics;
use crate::networking::seen_cache::SeenCache;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Listener errors.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The announce socket could not be bound.
    #[error("bind announce socket")]
    Bind,
}

const READ_BUFFER: usize = 1024;
const RECV_DEADLINE: Duration = Duration::from_secs(5);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// One pass of the validation pipeline over a decoded datagram, §4.4 steps 2-6.
/// Returns the accepted event, or `None` if any step drops the datagram.
fn validate(
    bytes: &[u8],
    self_id: &str,
    seen: &SeenCache,
    evict_after: Duration,
    freshness_window: Duration,
    metrics: &Metrics,
    now: Instant,
) -> Option<AnnounceEvent> {
    let announce = match wire::decode(bytes) {
        Ok(a) => a,
        Err(_) => return None,
    };

    if announce.id == self_id {
        metrics.announces_dropped_self_total.inc();
        return None;
    }

    if !wire::verify(&announce) {
        metrics.announces_dropped_verify_total.inc();
        return None;
    }

    if seen.seen(&announce.id, &announce.nonce, now) {
        metrics.announces_dropped_replay_total.inc();
        return None;
    }
    seen.add(&announce.id, &announce.nonce, now, now + evict_after);

    let skew = now_ms().abs_diff(announce.epoch_ms);
    if skew > freshness_window.as_millis() as u64 {
        metrics.announces_dropped_stale_total.inc();
        return None;
    }

    let address = SocketAddrV4::new(announce.addr, announce.udp_port);
    metrics.announces_accepted_total.inc();
    Some(AnnounceEvent { id: announce.id, address })
}

/// Run the listener until `cancel` fires. Binds `0.0.0.0:announce_port` once
/// and never rebinds (§5 resource policy).
#[allow(clippy::too_many_arguments)]
pub async fn run(
    announce_port: u16,
    self_id: String,
    seen: Arc<SeenCache>,
    bus: BusSender,
    metrics: Arc<Metrics>,
    evict_after: Duration,
    freshness_window: Duration,
    cancel: CancellationToken,
) -> Result<(), ListenerError> {
    let socket = UdpSocket::bind(("0.0.0.0", announce_port))
        .await
        .map_err(|_| ListenerError::Bind)?;
    let mut buf = [0u8; READ_BUFFER];

    loop {
        if cancel.is_cancelled() {
            debug!("listener cancelled");
            return Ok(());
        }

        let recv = tokio::time::timeout(RECV_DEADLINE, socket.recv_from(&mut buf));
        let (n, _from) = match recv.await {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                warn!(%err, "announce recv failed");
                continue;
            }
            Err(_) => continue, // deadline elapsed; loop back and re-check cancellation
        };

        if let Some(event) = validate(
            &buf[..n],
            &self_id,
            &seen,
            evict_after,
            freshness_window,
            &metrics,
            Instant::now(),
        ) {
            if bus.send_announce(event).await.is_err() {
                debug!("bus closed; listener exiting");
                return Ok(());
            }
        }
    }
}
