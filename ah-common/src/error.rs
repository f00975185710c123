//! Error types shared across the ah-agent crates.

use thiserror::Error;

/// All possible errors that can occur within `ah-common`.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to TLV encoding/decoding.
    #[error("TLV error: {0}")]
    Tlv(String),

    /// Error related to NDN name/packet processing.
    #[error("NDN packet error: {0}")]
    NdnPacket(String),

    /// Error related to signing or signature verification.
    #[error("signing error: {0}")]
    Signing(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("other error: {0}")]
    Other(String),
}
