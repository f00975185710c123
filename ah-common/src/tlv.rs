//! Generic TLV (Type-Length-Value) encoding and decoding.
//!
//! This is the "library" the daemon is built against for wire encoding: a
//! minimal, dependency-free implementation of the NDN-TLV length-prefixing
//! scheme. It knows nothing about Interests, Data, or the forwarder
//! management protocol — those are layered on top in [`crate::packet`] and in
//! the `ah-agent` crate's `fcc` module.

use crate::error::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Core NDN packet TLV-TYPE assignments (NDN packet format v0.3).
pub const TLV_INTEREST: u8 = 0x05;
pub const TLV_DATA: u8 = 0x06;
pub const TLV_NAME: u8 = 0x07;
pub const TLV_COMPONENT: u8 = 0x08;
pub const TLV_NONCE: u8 = 0x0A;
pub const TLV_INTEREST_LIFETIME: u8 = 0x0C;
pub const TLV_CAN_BE_PREFIX: u8 = 0x21;
pub const TLV_MUST_BE_FRESH: u8 = 0x12;
pub const TLV_META_INFO: u8 = 0x14;
pub const TLV_CONTENT: u8 = 0x15;
pub const TLV_SIGNATURE_INFO: u8 = 0x16;
pub const TLV_SIGNATURE_VALUE: u8 = 0x17;
pub const TLV_FRESHNESS_PERIOD: u8 = 0x19;

/// Local wrapper type used to carry a NACK reason over this agent's own
/// unicast wire framing (NDNLPv2 Nack fields don't fit the single-byte type
/// space this codec supports, so the agent uses a type from the
/// application-local range instead).
pub const TLV_NACK: u8 = 0x80;
pub const TLV_NACK_REASON: u8 = 0x81;

/// Encodes a TLV type field.
///
/// Currently only supports single-byte TLV types (0-255), which is
/// sufficient for every type this crate defines.
pub fn encode_tlv_type(tlv_type: u8, buf: &mut BytesMut) {
    buf.put_u8(tlv_type);
}

/// Encodes a TLV length field.
///
/// Supports variable-length encoding:
/// - If length < 253, uses 1 byte
/// - If length <= 65535, uses 3 bytes (253 + 2 bytes)
/// - If length > 65535, uses 5 bytes (254 + 4 bytes)
pub fn encode_tlv_length(length: usize, buf: &mut BytesMut) {
    if length < 253 {
        buf.put_u8(length as u8);
    } else if length <= 65535 {
        buf.put_u8(253);
        buf.put_u16(length as u16);
    } else {
        buf.put_u8(254);
        buf.put_u32(length as u32);
    }
}

/// Decodes a TLV type field.
pub fn decode_tlv_type(buf: &mut impl Buf) -> Result<u8, Error> {
    if !buf.has_remaining() {
        return Err(Error::Tlv("buffer underflow when decoding TLV type".into()));
    }
    Ok(buf.get_u8())
}

/// Decodes a TLV length field.
pub fn decode_tlv_length(buf: &mut impl Buf) -> Result<usize, Error> {
    if !buf.has_remaining() {
        return Err(Error::Tlv("buffer underflow when decoding TLV length".into()));
    }

    let first_byte = buf.get_u8();

    match first_byte {
        0..=252 => Ok(first_byte as usize),
        253 => {
            if buf.remaining() < 2 {
                return Err(Error::Tlv("buffer underflow when decoding 16-bit TLV length".into()));
            }
            Ok(buf.get_u16() as usize)
        }
        254 => {
            if buf.remaining() < 4 {
                return Err(Error::Tlv("buffer underflow when decoding 32-bit TLV length".into()));
            }
            Ok(buf.get_u32() as usize)
        }
        255 => Err(Error::Tlv("64-bit TLV lengths not supported".into())),
    }
}

/// A generic TLV element consisting of a type, length, and value.
#[derive(Debug, Clone, PartialEq)]
pub struct TlvElement {
    pub tlv_type: u8,
    pub value: Bytes,
}

impl TlvElement {
    /// Creates a new TLV element.
    pub fn new(tlv_type: u8, value: impl Into<Bytes>) -> Self {
        Self {
            tlv_type,
            value: value.into(),
        }
    }

    /// Creates a TLV element whose value is a big-endian non-negative integer,
    /// matching the encoding NFD's management protocol uses for numeric
    /// control-parameter fields (FaceId, Cost, Origin, ...).
    pub fn nonneg_integer(tlv_type: u8, value: u64) -> Self {
        let mut buf = BytesMut::new();
        if value <= u8::MAX as u64 {
            buf.put_u8(value as u8);
        } else if value <= u16::MAX as u64 {
            buf.put_u16(value as u16);
        } else if value <= u32::MAX as u64 {
            buf.put_u32(value as u32);
        } else {
            buf.put_u64(value);
        }
        Self::new(tlv_type, buf.freeze())
    }

    /// Reads this element's value as a big-endian non-negative integer.
    pub fn as_nonneg_integer(&self) -> Result<u64, Error> {
        match self.value.len() {
            1 => Ok(self.value[0] as u64),
            2 => Ok(u16::from_be_bytes(self.value[..2].try_into().unwrap()) as u64),
            4 => Ok(u32::from_be_bytes(self.value[..4].try_into().unwrap()) as u64),
            8 => Ok(u64::from_be_bytes(self.value[..8].try_into().unwrap())),
            n => Err(Error::Tlv(format!("invalid non-negative integer length {n}"))),
        }
    }

    /// Returns the total length of this TLV element when encoded.
    pub fn len(&self) -> usize {
        let value_len = self.value.len();
        1 + tlv_length_size(value_len) + value_len
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Encodes this TLV element into the provided buffer.
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_tlv_type(self.tlv_type, buf);
        encode_tlv_length(self.value.len(), buf);
        buf.extend_from_slice(&self.value);
    }

    /// Decodes a TLV element from the provided buffer.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < 2 {
            return Err(Error::Tlv("buffer too small for TLV".into()));
        }

        let tlv_type = decode_tlv_type(buf)?;
        let length = decode_tlv_length(buf)?;

        if buf.remaining() < length {
            return Err(Error::Tlv(format!(
                "buffer underflow: TLV value requires {} bytes but only {} available",
                length,
                buf.remaining()
            )));
        }

        let mut value = BytesMut::with_capacity(length);
        let mut take = buf.take(length);
        value.extend_from_reader(&mut take)?;

        Ok(Self {
            tlv_type,
            value: value.freeze(),
        })
    }

    /// Expects a specific TLV type, returning a decode error otherwise.
    pub fn expect_type(self, expected: u8) -> Result<Self, Error> {
        if self.tlv_type != expected {
            return Err(Error::Tlv(format!(
                "expected TLV type {expected}, got {}",
                self.tlv_type
            )));
        }
        Ok(self)
    }
}

fn tlv_length_size(length: usize) -> usize {
    if length < 253 {
        1
    } else if length <= 65535 {
        3
    } else {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_short_element() {
        let el = TlvElement::new(TLV_NAME, Bytes::from_static(b"hello"));
        let mut buf = BytesMut::new();
        el.encode(&mut buf);
        assert_eq!(buf.len(), el.len());
        let mut cursor = buf.freeze();
        let decoded = TlvElement::decode(&mut cursor).unwrap();
        assert_eq!(decoded, el);
    }

    #[test]
    fn round_trips_long_element() {
        let value = Bytes::from(vec![0xABu8; 70_000]);
        let el = TlvElement::new(TLV_CONTENT, value.clone());
        let mut buf = BytesMut::new();
        el.encode(&mut buf);
        let mut cursor = buf.freeze();
        let decoded = TlvElement::decode(&mut cursor).unwrap();
        assert_eq!(decoded.value, value);
    }

    #[test]
    fn nonneg_integer_round_trip() {
        for v in [0u64, 1, 255, 256, 65535, 65536, u32::MAX as u64, u32::MAX as u64 + 1] {
            let el = TlvElement::nonneg_integer(0x69, v);
            assert_eq!(el.as_nonneg_integer().unwrap(), v);
        }
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let mut buf = Bytes::from_static(&[TLV_NAME, 10, 1, 2, 3]);
        assert!(TlvElement::decode(&mut buf).is_err());
    }
}
