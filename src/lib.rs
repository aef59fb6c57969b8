#![forbid(unsafe_code)]

//! Library side of the reeltube feed backend.
//!
//! The binary in `src/bin/backend.rs` only wires these modules together; the
//! catalog, HTTP routes, configuration layering and snapshot writer all live
//! here so they can be tested without a socket.

pub mod api;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod snapshot;
