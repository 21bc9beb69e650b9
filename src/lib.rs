//! Perfboost
//!
//! Client side of the perfboostd socket, and the workspace's umbrella package. The
//! arbitration engine lives in `pb-core`, the wire format in `pb-protocol`.

pub mod client;

pub use client::DaemonClient;
pub use pb_core as core;
pub use pb_protocol as protocol;
