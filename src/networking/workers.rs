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

//! The probe worker pool (C7): a fixed number of tasks, each pulling probe
//! requests off the shared bus channel and publishing probe responses.

use crate::core::bus::{BusSender, ProbeResponse};
use crate::monitoring::metrics::Metrics;
use crate::networking::probe;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run one worker: loop pulling a request from the shared receiver, probe,
/// publish the response. Multiple workers share `probe_request_rx` behind a
/// mutex since `tokio::sync::mpsc::Receiver` has exactly one owner; taking
/// the lock only around `recv` keeps them acting as independent consumers.
async fn worker_loop(
    worker_id: usize,
    requests: Arc<Mutex<tokio::sync::mpsc::Receiver<crate::core::bus::ProbeRequest>>>,
    bus: BusSender,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(worker_id, "probe worker cancelled");
                return;
            }
            request = async {
                let mut guard = requests.lock().await;
                guard.recv().await
            } => request,
        };

        let Some(request) = request else {
            debug!(worker_id, "probe request channel closed");
            return;
        };

        metrics.probe_workers_busy.inc();
        let (ok, rtt) = probe::probe_once(request.address).await;
        metrics.probe_workers_busy.dec();
        let response = ProbeResponse {
            id: request.id,
            ok,
            rtt,
            when: SystemTime::now(),
        };
        if bus.send_probe_response(response).await.is_err() {
            debug!(worker_id, "bus closed; probe worker exiting");
            return;
        }
    }
}

/// Spawn `worker_count` probe workers sharing `requests`; returns their
/// join handles so callers can await a clean shutdown.
pub fn spawn_pool(
    worker_count: usize,
    requests: tokio::sync::mpsc::Receiver<crate::core::bus::ProbeRequest>,
    bus: BusSender,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let requests = Arc::new(Mutex::new(requests));
    (0..worker_count)
        .map(|id| {
            let requests = requests.clone();
            let bus = bus.clone();
            let metrics = metrics.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker_loop(id, requests, bus, metrics, cancel).await })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bus::new_bus;
    use crate::networking::probe::run_echo_server;
    use std::net::{Ipv4Addr, SocketAddrV4};

    #[tokio::test]
    async fn a_probe_request_yields_a_probe_response() {
        let (bus_tx, mut bus_rx, probe_tx, probe_request_rx) = new_bus();
        let cancel = CancellationToken::new();

        let echo_cancel = cancel.clone();
        tokio::spawn(async move { run_echo_server(19125, echo_cancel).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let metrics = Arc::new(Metrics::new().expect("metrics"));
        let handles = spawn_pool(2, probe_request_rx, bus_tx.clone(), metrics, cancel.clone());

        probe_tx
            .probe_request_tx
            .send(crate::core::bus::ProbeRequest {
                id: "peer-a".into(),
                address: SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 19125),
            })
            .await
            .expect("send probe request");

        let response = bus_rx.probe_response_rx.recv().await.expect("probe response");
        assert_eq!(response.id, "peer-a");
        assert!(response.ok);

        cancel.cancel();
        for h in handles {
            let _ = h.await;
        }
    }
}
