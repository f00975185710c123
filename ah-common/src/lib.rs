//! Shared NDN types and wire primitives for the ah-agent auto-host daemon.
//!
//! This crate plays the role of a small internal "library": Name/Interest/Data
//! types, a generic TLV codec, and a pluggable interest-signing primitive. None
//! of it is specific to peer discovery — the daemon crate builds the discovery
//! protocol and forwarder-control client on top of these.

pub mod error;
pub mod keychain;
pub mod metrics;
pub mod name;
pub mod packet;
pub mod tlv;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
