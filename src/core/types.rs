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

//! Core data model: peers, their liveness status, and probe addressing.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::SystemTime;

/// Peer liveness status. Numeric values are part of the wire contract:
/// the HTTP `/peers` endpoint serializes this as the same 0..3 integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    /// Never successfully probed; freshly created from an announcement.
    Unknown = 0,
    /// Announced or probed recently.
    Healthy = 1,
    /// Aging past `stale_after` with no successful probe.
    Suspect = 2,
    /// Aging past `down_after`; excluded from further probing.
    Down = 3,
}

/// One remote instance known to this one via at least one valid announcement.
#[derive(Clone, Debug)]
pub struct Peer {
    /// Hex of the peer's Ed25519 public key. Immutable once set (I2).
    pub id: String,
    /// Address at which to probe this peer.
    pub address: SocketAddrV4,
    /// Wall-clock time of the last accepted announcement.
    pub last_seen: SystemTime,
    /// Wall-clock time of the last received probe response.
    pub last_probe: Option<SystemTime>,
    /// EWMA of successful probe RTTs, in milliseconds.
    pub rtt_ms: f64,
    /// Current liveness status.
    pub status: Status,
}

impl Peer {
    /// Create a freshly observed peer in the `Unknown` state (I3).
    pub fn new(id: String, address: SocketAddrV4, now: SystemTime) -> Self {
        Self {
            id,
            address,
            last_seen: now,
            last_probe: None,
            rtt_ms: 0.0,
            status: Status::Unknown,
        }
    }
}

/// The on-the-wire announcement record (see `crate::core::wire` for codec details).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Announce {
    /// Hex of the sender's Ed25519 public key. Empty until `sign` fills it in.
    #[serde(default)]
    pub id: String,
    /// Free-text host name. Decoded but never stored (see Open Question b).
    #[serde(default)]
    pub name: String,
    /// Sender's local IPv4 address, used as the probe target address.
    #[serde(default)]
    pub addr: Ipv4Addr,
    /// Probe (UDP echo) port at `addr`.
    #[serde(default)]
    pub udp_port: u16,
    /// Free-text version string.
    #[serde(default)]
    pub version: String,
    /// Sender wall-clock time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub epoch_ms: u64,
    /// 12 random bytes, unique per announcement from a given sender. Hex-encoded
    /// on the wire; a malformed hex string fails decode (it is not silently
    /// truncated or padded, so length checks downstream stay meaningful).
    #[serde(default, with = "hex_bytes")]
    pub nonce: Vec<u8>,
    /// Ed25519 public key bytes, expected length 32. Hex-encoded on the wire.
    #[serde(default, with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Ed25519 signature bytes, expected length 64. Hex-encoded on the wire.
    #[serde(default, with = "hex_bytes")]
    pub signature: Vec<u8>,
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim()).map_err(D::Error::custom)
    }
}
