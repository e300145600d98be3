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

//! The bus: typed rendezvous channels connecting every component to the
//! Table. This is the only inter-component communication mechanism (I1);
//! no other shared state crosses between the listener, announcer, probe
//! workers, and the table loop.
//!
//! Tokio's `mpsc` requires a capacity of at least one, so true zero-buffer
//! rendezvous (as in the original Go implementation's unbuffered channels)
//! is approximated with capacity-1 channels: a sender still blocks until the
//! table loop is ready to receive the *next* message after the one already
//! in flight, which preserves the backpressure property `spec.md` §4.6 and
//! §5 rely on. See DESIGN.md for this Open Question's resolution.

use crate::core::types::{Peer, Status};
use serde::Serialize;
use std::net::SocketAddrV4;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot};

const CHANNEL_CAPACITY: usize = 1;

/// A validated announcement handed from the listener to the table.
#[derive(Clone, Debug)]
pub struct AnnounceEvent {
    /// The announcing peer's id.
    pub id: String,
    /// Address at which to reach the peer for probing.
    pub address: SocketAddrV4,
}

/// A request from the table to a probe worker.
#[derive(Clone, Debug)]
pub struct ProbeRequest {
    /// Target peer id.
    pub id: String,
    /// Target probe address.
    pub address: SocketAddrV4,
}

/// A probe outcome published by a worker back to the table.
#[derive(Clone, Debug)]
pub struct ProbeResponse {
    /// Target peer id.
    pub id: String,
    /// Whether the echo was received before the deadline.
    pub ok: bool,
    /// Measured round-trip time. Zero when `ok` is false.
    pub rtt: Duration,
    /// Wall-clock time the response was observed.
    pub when: SystemTime,
}

/// A request for the current peer snapshot.
#[derive(Debug)]
pub struct ListPeersRequest {
    /// Where to send the snapshot.
    pub reply: oneshot::Sender<PeerListSnapshot>,
}

/// A single peer as rendered in the `/peers` JSON response.
#[derive(Clone, Debug, Serialize)]
pub struct PeerView {
    /// Hex peer id.
    #[serde(rename = "ID")]
    pub id: String,
    /// `ip:port` probe address.
    #[serde(rename = "Address")]
    pub address: String,
    /// RFC3339 timestamp of the last accepted announcement.
    #[serde(rename = "LastSeen")]
    pub last_seen: String,
    /// RFC3339 timestamp of the last probe response, if any.
    #[serde(rename = "LastProbe")]
    pub last_probe: String,
    /// EWMA round-trip time in milliseconds.
    #[serde(rename = "RTTms")]
    pub rtt_ms: f64,
    /// Liveness status as the 0..3 integer enum.
    #[serde(rename = "Status")]
    pub status: u8,
}

fn to_rfc3339(t: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339()
}

impl PeerView {
    /// Build the HTTP view of a `Peer`.
    pub fn from_peer(p: &Peer) -> Self {
        Self {
            id: p.id.clone(),
            address: p.address.to_string(),
            last_seen: to_rfc3339(p.last_seen),
            last_probe: p
                .last_probe
                .map(to_rfc3339)
                .unwrap_or_default(),
            rtt_ms: p.rtt_ms,
            status: p.status as u8,
        }
    }
}

/// Snapshot of the whole peer table at a point in time.
#[derive(Clone, Debug, Serialize)]
pub struct PeerListSnapshot {
    /// RFC3339 timestamp the snapshot was taken.
    #[serde(rename = "When")]
    pub when: String,
    /// Every known peer.
    #[serde(rename = "Peers")]
    pub peers: Vec<PeerView>,
}

impl PeerListSnapshot {
    /// Build a snapshot from a `now` and a peer iterator.
    pub fn new<'a>(now: SystemTime, peers: impl Iterator<Item = &'a Peer>) -> Self {
        Self {
            when: to_rfc3339(now),
            peers: peers.map(PeerView::from_peer).collect(),
        }
    }
}

/// Sending halves of the bus, held by producers (listener, workers, HTTP shim).
#[derive(Clone)]
pub struct BusSender {
    announce_tx: mpsc::Sender<AnnounceEvent>,
    probe_response_tx: mpsc::Sender<ProbeResponse>,
    list_peers_tx: mpsc::Sender<ListPeersRequest>,
}

impl BusSender {
    /// Submit an accepted announcement.
    pub async fn send_announce(&self, event: AnnounceEvent) -> Result<(), BusError> {
        self.announce_tx
            .send(event)
            .await
            .map_err(|_| BusError::Closed)
    }

    /// Publish a probe outcome.
    pub async fn send_probe_response(&self, response: ProbeResponse) -> Result<(), BusError> {
        self.probe_response_tx
            .send(response)
            .await
            .map_err(|_| BusError::Closed)
    }

    /// Request a peer snapshot and await the reply.
    pub async fn list_peers(&self) -> Result<PeerListSnapshot, BusError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.list_peers_tx
            .send(ListPeersRequest { reply: reply_tx })
            .await
            .map_err(|_| BusError::Closed)?;
        reply_rx.await.map_err(|_| BusError::Closed)
    }
}

/// Receiving halves of the bus consumed by the table loop. Probe requests
/// are consumed by the worker pool instead, via the standalone receiver
/// `new_bus` hands back alongside this struct.
pub struct BusReceiver {
    /// Announce events, consumed only by the table loop.
    pub announce_rx: mpsc::Receiver<AnnounceEvent>,
    /// Probe responses, consumed only by the table loop.
    pub probe_response_rx: mpsc::Receiver<ProbeResponse>,
    /// List-peers requests, consumed only by the table loop.
    pub list_peers_rx: mpsc::Receiver<ListPeersRequest>,
}

/// The table loop's outbound handle: the only sender of probe requests.
#[derive(Clone)]
pub struct ProbeRequestSender {
    /// Channel shared by every probe worker.
    pub probe_request_tx: mpsc::Sender<ProbeRequest>,
}

/// Bus construction errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The receiving end (the table loop) has shut down.
    #[error("bus channel closed")]
    Closed,
}

/// Construct the bus: the sender handle shared by external producers, the
/// receiver handle owned by the table loop, the probe-request sender shared
/// by the table loop, and the probe-request receiver shared by the worker
/// pool.
pub fn new_bus() -> (BusSender, BusReceiver, ProbeRequestSender, mpsc::Receiver<ProbeRequest>) {
    let (announce_tx, announce_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (probe_request_tx, probe_request_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (probe_response_tx, probe_response_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (list_peers_tx, list_peers_rx) = mpsc::channel(CHANNEL_CAPACITY);

    (
        BusSender {
            announce_tx,
            probe_response_tx,
            list_peers_tx,
        },
        BusReceiver {
            announce_rx,
            probe_response_rx,
            list_peers_rx,
        },
        ProbeRequestSender { probe_request_tx },
        probe_request_rx,
    )
}

/// Used only by the table loop, which is the sole writer of the peer map (I1)
/// and therefore the sole emitter of probe requests.
pub fn status_label(status: Status) -> &'static str {
    match status {
        Status::Unknown => "unknown",
        Status::Healthy => "healthy",
        Status::Suspect => "suspect",
        Status::Down => "down",
    }
}
