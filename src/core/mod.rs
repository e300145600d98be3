#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Core protocol primitives: the data model, the wire codec, the bus, and the
//! single-owner peer table.

pub mod bus;
pub mod table;
pub mod types;
pub mod wire;
