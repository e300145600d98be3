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

//! The announcement wire format: a self-describing JSON text form for transport,
//! and a deterministic binary sign-bytes form for authentication.
//!
//! Authentication is over the sign-bytes layout in this module, never over the
//! JSON text itself, to avoid field-order and whitespace ambiguity across
//! independently-implemented decoders (P2).

use crate::core::types::Announce;
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use thiserror::Error;

/// Codec errors.
#[derive(Debug, Error)]
pub enum WireError {
    /// The input could not be parsed as an announcement.
    #[error("malformed announcement")]
    Malformed,
}

const SIGN_BYTES_TAG: &[u8; 4] = b"ann2";
const FAMILY_IPV4: u8 = 4;

/// Serialize an announcement to its self-describing JSON text form.
pub fn encode(a: &Announce) -> Vec<u8> {
    // `serde_json::to_vec` only fails on non-serializable types or a failing
    // `Serialize` impl; `Announce`'s fields are all plain data, so this cannot fail.
    serde_json::to_vec(a).unwrap_or_default()
}

/// Parse the JSON text form. Missing fields default to their zero value (see
/// `Announce`'s `#[serde(default)]` fields); malformed JSON fails.
pub fn decode(bytes: &[u8]) -> Result<Announce, WireError> {
    serde_json::from_slice(bytes).map_err(|_| WireError::Malformed)
}

/// Returns `Some(raw pubkey bytes)` if `id` is a valid 64-char hex string, else `None`.
fn id_as_pubkey_bytes(id: &str) -> Option<[u8; 32]> {
    let trimmed = id.trim();
    if trimmed.len() != 64 {
        return None;
    }
    let bytes = hex::decode(trimmed).ok()?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Some(out)
}

/// The deterministic canonical byte sequence that is signed and verified.
/// See `SPEC_FULL.md` §4.1 for the exact layout; this function is the sole
/// authority for it and every byte here is load-bearing for P1/P2.
pub fn sign_bytes(a: &Announce) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(SIGN_BYTES_TAG);

    match id_as_pubkey_bytes(&a.id) {
        Some(raw) => {
            out.push(raw.len() as u8);
            out.extend_from_slice(&raw);
        }
        None => {
            let bytes = a.id.as_bytes();
            out.push(bytes.len().min(u8::MAX as usize) as u8);
            out.extend_from_slice(&bytes[..bytes.len().min(u8::MAX as usize)]);
        }
    }

    out.push(FAMILY_IPV4);
    out.extend_from_slice(&a.addr.octets());

    out.extend_from_slice(&(a.udp_port as u64).to_be_bytes());

    let version = a.version.as_bytes();
    out.push(version.len().min(u8::MAX as usize) as u8);
    out.extend_from_slice(&version[..version.len().min(u8::MAX as usize)]);

    out.extend_from_slice(&a.epoch_ms.to_be_bytes());
    out.extend_from_slice(&a.nonce);

    out
}

/// Sign an announcement in place: fills `public_key` and `id` if empty, then
/// writes `signature` over `sign_bytes(a)`.
pub fn sign(a: &mut Announce, keypair: &Ed25519KeyPair) {
    if a.public_key.is_empty() {
        a.public_key = keypair.public_key().as_ref().to_vec();
    }
    if a.id.is_empty() {
        a.id = hex::encode(&a.public_key);
    }
    let sig = keypair.sign(&sign_bytes(a));
    a.signature = sig.as_ref().to_vec();
}

/// Verify an announcement's signature. Never panics; any malformation (bad
/// lengths, id/pubkey mismatch, bad signature) simply returns `false`.
pub fn verify(a: &Announce) -> bool {
    if a.public_key.len() != 32 || a.signature.len() != 64 {
        return false;
    }
    if a.id != hex::encode(&a.public_key) {
        return false;
    }
    let key = UnparsedPublicKey::new(&ED25519, &a.public_key);
    key.verify(&sign_bytes(a), &a.signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use std::net::Ipv4Addr;

    fn fresh_keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("generate");
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("parse")
    }

    fn sample_announce() -> Announce {
        Announce {
            name: "host-a".into(),
            addr: Ipv4Addr::new(192, 168, 1, 2),
            udp_port: 9125,
            version: "0.1".into(),
            epoch_ms: 1_700_000_000_000,
            nonce: b"abcdefghijkl".to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn sign_then_verify_roundtrips() {
        let kp = fresh_keypair();
        let mut a = sample_announce();
        sign(&mut a, &kp);
        assert!(verify(&a));
        assert_eq!(a.id, hex::encode(a.public_key));
    }

    #[test]
    fn flipping_a_sign_byte_breaks_verification() {
        let kp = fresh_keypair();
        let mut a = sample_announce();
        sign(&mut a, &kp);
        a.epoch_ms += 1; // mutates the sign-bytes without re-signing
        assert!(!verify(&a));
    }

    #[test]
    fn encode_decode_roundtrip_preserves_verification() {
        let kp = fresh_keypair();
        let mut a = sample_announce();
        sign(&mut a, &kp);
        let encoded = encode(&a);
        let decoded = decode(&encoded).expect("decode");
        assert!(verify(&decoded));
        assert_eq!(decoded.id, a.id);
    }

    #[test]
    fn decode_malformed_input_fails() {
        assert!(decode(b"not json").is_err());
    }

    #[test]
    fn decode_defaults_missing_fields() {
        let a = decode(br#"{}"#).expect("decode");
        assert_eq!(a.id, "");
        assert_eq!(a.udp_port, 0);
        assert!(a.nonce.is_empty());
    }

    #[test]
    fn sign_bytes_independent_of_field_order() {
        // Two Announces agreeing on the sign-bytes-relevant fields but built
        // through different field-assignment orders must produce identical bytes.
        let mut a = Announce::default();
        a.addr = Ipv4Addr::new(10, 0, 0, 1);
        a.udp_port = 1234;
        a.version = "v".into();
        a.epoch_ms = 42;
        a.nonce = vec![1; 12];

        let mut b = Announce::default();
        b.nonce = vec![1; 12];
        b.epoch_ms = 42;
        b.version = "v".into();
        b.udp_port = 1234;
        b.addr = Ipv4Addr::new(10, 0, 0, 1);

        assert_eq!(sign_bytes(&a), sign_bytes(&b));
    }

    #[test]
    fn unverified_announce_fails() {
        let a = sample_announce();
        assert!(!verify(&a));
    }
}
