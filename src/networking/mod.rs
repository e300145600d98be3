#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: interface enumeration, the UDP announce/probe loops, anti-replay,
//! and the fixed-size probe worker pool.

pub mod announcer;
pub mod listener;
pub mod netx;
pub mod probe;
pub mod seen_cache;
pub mod workers;
