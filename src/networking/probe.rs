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

//! The probe echo server (C5) and probe client (C6).

use std::net::SocketAddrV4;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Probe errors.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The echo server's socket could not be bound.
    #[error("bind probe echo socket")]
    Bind,
}

const SENTINEL: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];
const ECHO_BUFFER: usize = 2048;
const REPLY_BUFFER: usize = 16;
const PROBE_DEADLINE: Duration = Duration::from_secs(1);

/// Bind the echo responder on `0.0.0.0:port` and serve until `cancel` fires.
/// Every received datagram is written back verbatim to its sender (§4.8).
pub async fn run_echo_server(port: u16, cancel: CancellationToken) -> Result<(), ProbeError> {
    let socket = UdpSocket::bind(("0.0.0.0", port))
        .await
        .map_err(|_| ProbeError::Bind)?;
    let mut buf = [0u8; ECHO_BUFFER];

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("echo server cancelled");
                return Ok(());
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, from)) => {
                        if let Err(err) = socket.send_to(&buf[..n], from).await {
                            warn!(%err, "echo reply failed");
                        }
                    }
                    Err(err) => warn!(%err, "echo recv failed"),
                }
            }
        }
    }
}

/// Probe one peer: connect, send the sentinel, wait for any reply before the
/// deadline. Never fails outward: any error collapses to `(false, 0)` (§4.5).
pub async fn probe_once(target: SocketAddrV4) -> (bool, Duration) {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(s) => s,
        Err(err) => {
            debug!(%err, "probe socket bind failed");
            return (false, Duration::ZERO);
        }
    };
    if let Err(err) = socket.connect(target).await {
        debug!(%err, %target, "probe connect failed");
        return (false, Duration::ZERO);
    }

    let start = Instant::now();
    let attempt = async {
        socket.send(&SENTINEL).await?;
        let mut reply = [0u8; REPLY_BUFFER];
        socket.recv(&mut reply).await
    };

    match tokio::time::timeout(PROBE_DEADLINE, attempt).await {
        Ok(Ok(_)) => (true, start.elapsed()),
        Ok(Err(err)) => {
            debug!(%err, %target, "probe io failed");
            (false, Duration::ZERO)
        }
        Err(_) => {
            debug!(%target, "probe timed out");
            (false, Duration::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn echo_server_cancels_promptly() {
        let cancel = CancellationToken::new();
        let server_cancel = cancel.clone();
        let handle = tokio::spawn(async move { run_echo_server(0, server_cancel).await });
        cancel.cancel();
        assert!(handle.await.expect("echo task").is_ok());
    }

    #[tokio::test]
    async fn probe_against_closed_port_fails_without_hanging() {
        let target = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1);
        let (ok, rtt) = probe_once(target).await;
        assert!(!ok);
        assert_eq!(rtt, Duration::ZERO);
    }

    #[tokio::test]
    async fn probe_against_live_echo_socket_succeeds() {
        let echo = UdpSocket::bind("127.0.0.1:0").await.expect("bind echo");
        let echo_addr = echo.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let mut buf = [0u8; ECHO_BUFFER];
            if let Ok((n, from)) = echo.recv_from(&mut buf).await {
                let _ = echo.send_to(&buf[..n], from).await;
            }
        });

        let target = match echo_addr {
            std::net::SocketAddr::V4(v4) => v4,
            _ => unreachable!("ipv4 bind"),
        };
        let (ok, _rtt) = probe_once(target).await;
        assert!(ok);
        server.await.expect("echo task");
    }
}
