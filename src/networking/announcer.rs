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

//! The announcer (C3): on a fixed cadence, broadcasts a freshly signed
//! announcement out of every eligible interface.

use crate::core::types::Announce;
use crate::core::wire;
use crate::monitoring::metrics::Metrics;
use crate::networking::netx::InterfaceInfo;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::Ed25519KeyPair;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const NONCE_LEN: usize = 12;

/// Announcer errors. Only the random source failing is fatal (`spec.md` §7:
/// "Cryptographic failure at send time... fatal"); socket/IO failures for a
/// single interface are logged and skipped instead (§4.3).
#[derive(Debug, Error)]
pub enum AnnouncerError {
    /// The secure random source failed while filling a nonce.
    #[error("random source failed while filling announce nonce")]
    RandomSourceFailed,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Broadcast one signed announcement out of `interface` to `announce_port`.
/// Opens an ephemeral socket bound to the interface's address and closes it
/// on return (§4.3 step 3). Socket/IO failures are logged and swallowed,
/// never retried; a random-source failure is propagated instead, since that
/// one is fatal to the whole process (§7).
async fn announce_via(
    interface: InterfaceInfo,
    template: &Announce,
    announce_port: u16,
    keypair: &Ed25519KeyPair,
    rng: &SystemRandom,
    metrics: &Metrics,
) -> Result<(), AnnouncerError> {
    let mut announce = template.clone();
    announce.addr = interface.ipv4;
    announce.epoch_ms = now_ms();

    let mut nonce = vec![0u8; NONCE_LEN];
    rng.fill(&mut nonce).map_err(|_| AnnouncerError::RandomSourceFailed)?;
    announce.nonce = nonce;

    wire::sign(&mut announce, keypair);
    let packet = wire::encode(&announce);

    let socket = match UdpSocket::bind((interface.ipv4, 0)).await {
        Ok(s) => s,
        Err(err) => {
            warn!(%err, %interface.ipv4, "announce socket bind failed");
            return Ok(());
        }
    };
    if let Err(err) = socket.set_broadcast(true) {
        warn!(%err, "set_broadcast failed");
        return Ok(());
    }

    let target = (interface.broadcast, announce_port);
    match socket.send_to(&packet, target).await {
        Ok(_) => {
            metrics.announces_sent_total.inc();
            debug!(%interface.broadcast, announce_port, "announced");
        }
        Err(err) => warn!(%err, %interface.broadcast, "announce send failed"),
    }
    Ok(())
}

/// Run the announcer loop until `cancel` fires. `interfaces` is the fixed
/// set enumerated at startup (`spec.md` treats interface enumeration as an
/// external collaborator, not something re-polled per tick).
///
/// Returns `Err` if the random source fails while signing an announcement;
/// the caller must treat that as fatal and exit the process (§7).
#[allow(clippy::too_many_arguments)]
pub async fn run(
    interfaces: Vec<InterfaceInfo>,
    host_name: String,
    probe_port: u16,
    announce_port: u16,
    interval: Duration,
    keypair: Ed25519KeyPair,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) -> Result<(), AnnouncerError> {
    let rng = SystemRandom::new();
    let template = Announce {
        name: host_name,
        udp_port: probe_port,
        version: env!("CARGO_PKG_VERSION").to_string(),
        ..Default::default()
    };

    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("announcer cancelled");
                return Ok(());
            }
            _ = tick.tick() => {
                for interface in &interfaces {
                    announce_via(*interface, &template, announce_port, &keypair, &rng, &metrics).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn fresh_keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("generate");
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("parse")
    }

    #[tokio::test]
    async fn announce_via_produces_verifiable_datagram_over_loopback() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.expect("bind listener");
        let listen_port = listener.local_addr().expect("addr").port();

        let interface = InterfaceInfo {
            ipv4: Ipv4Addr::LOCALHOST,
            broadcast: Ipv4Addr::LOCALHOST,
        };
        let template = Announce {
            name: "host-a".into(),
            udp_port: 9125,
            version: "0.1".into(),
            ..Default::default()
        };
        let keypair = fresh_keypair();
        let rng = SystemRandom::new();
        let metrics = Metrics::new().expect("metrics");

        announce_via(interface, &template, listen_port, &keypair, &rng, &metrics)
            .await
            .expect("announce_via ok");
        assert_eq!(metrics.announces_sent_total.get(), 1);

        let mut buf = [0u8; 1024];
        let (n, _) = tokio::time::timeout(Duration::from_secs(1), listener.recv_from(&mut buf))
            .await
            .expect("recv within deadline")
            .expect("recv ok");

        let decoded = wire::decode(&buf[..n]).expect("decode");
        assert!(wire::verify(&decoded));
        assert_eq!(decoded.addr, Ipv4Addr::LOCALHOST);
        assert_eq!(decoded.udp_port, 9125);
        assert_eq!(decoded.nonce.len(), NONCE_LEN);
    }
}
