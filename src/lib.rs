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

//! lanpeerdiscoveryd - a LAN peer-discovery daemon.
//!
//! Each instance broadcasts a signed UDP announcement on a fixed cadence,
//! listens for announcements from other instances on the same broadcast
//! domain, probes known peers for reachability and round-trip time, and
//! exposes the current peer view over a small HTTP interface.
//!
//! The engine is a single-owner state machine (the Table) fed entirely by
//! message passing over a typed bus; no other component ever touches the
//! peer map directly.

/// Configuration loaded from the process environment.
pub mod config;
/// Core protocol primitives: data model, wire codec, bus, and the Table.
pub mod core;
/// Observability: Prometheus metrics.
pub mod monitoring;
/// UDP networking: announcer, listener, probe client/server, worker pool.
pub mod networking;
/// The HTTP query shim.
pub mod server;
