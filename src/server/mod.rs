#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! The HTTP query shim (C10): an external collaborator exposing the bus'
//! read path over a small axum router.

pub mod http;
