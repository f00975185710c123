//! UDP-based NDN messaging substrate for the ah-agent auto-host daemon
//! (§4.10 "Messaging Face").
//!
//! This crate plays the role the teacher's `rust-udcn-quic` crate played for
//! its forwarder: a single transport type the rest of the daemon is built
//! against to exchange Interest/Data/Nack packets with a peer or with the
//! local forwarder. Unlike the teacher, the wire is a single UDP socket
//! (matching the discovery protocol's own unicast/multicast UDP model, per
//! the source material) rather than QUIC, so there's no per-connection
//! handshake, fragmentation, or TLS configuration to carry forward — one
//! socket serves every peer and the local forwarder alike, demultiplexed by
//! a pending-interest table keyed on `(name, nonce)`.

mod face;

pub use face::{Face, FaceEvent, IncomingInterest};

/// Maximum NDN packet size this transport will send or accept.
pub const MAX_PACKET_SIZE: usize = 8800;

/// Default interest lifetime used when a caller doesn't override it.
pub const DEFAULT_INTEREST_TIMEOUT_MS: u64 = 4000;
