//! Interest, Data, Nack, and forwarder-management control-parameter types.
//!
//! Grounded on the teacher's `ndn.rs` Interest/Data types, generalized with
//! proper `to_tlv`/`from_tlv` pairs (the teacher's own `packet.rs` called
//! `Interest::decode`/`encode` methods that didn't actually exist on its
//! `Interest` type; this module gives both types real, symmetric codecs).

use crate::error::Error;
use crate::name::Name;
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum size of an encoded packet the messaging face will send/accept.
pub const MAX_PACKET_SIZE: usize = 8800;

/* ---------------------------------------------------------------- *\
 * Interest
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    pub name: Name,
    pub nonce: u32,
    pub lifetime_ms: u32,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        let nonce = (now.as_nanos() % u32::MAX as u128) as u32;

        Self {
            name,
            nonce,
            lifetime_ms: 4000,
            can_be_prefix: false,
            must_be_fresh: true,
        }
    }

    pub fn with_lifetime(mut self, lifetime_ms: u32) -> Self {
        self.lifetime_ms = lifetime_ms;
        self
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.lifetime_ms as u64)
    }

    /// Key used to match an outstanding interest against its reply: the name
    /// plus nonce, matching NDN's duplicate-suppression key.
    pub fn pending_key(&self) -> (Name, u32) {
        (self.name.clone(), self.nonce)
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut buf = BytesMut::new();
        self.name.to_tlv().encode(&mut buf);
        TlvElement::nonneg_integer(tlv::TLV_NONCE, self.nonce as u64).encode(&mut buf);
        TlvElement::nonneg_integer(tlv::TLV_INTEREST_LIFETIME, self.lifetime_ms as u64).encode(&mut buf);
        if self.can_be_prefix {
            TlvElement::new(tlv::TLV_CAN_BE_PREFIX, Bytes::new()).encode(&mut buf);
        }
        if self.must_be_fresh {
            TlvElement::new(tlv::TLV_MUST_BE_FRESH, Bytes::new()).encode(&mut buf);
        }
        TlvElement::new(tlv::TLV_INTEREST, buf.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        let element = element.clone().expect_type(tlv::TLV_INTEREST)?;
        let mut buf = element.value.clone();

        let name_el = TlvElement::decode(&mut buf)?;
        let name = Name::from_tlv(&name_el)?;

        let mut nonce = 0u32;
        let mut lifetime_ms = 4000u32;
        let mut can_be_prefix = false;
        let mut must_be_fresh = false;

        while buf.has_remaining() {
            let el = TlvElement::decode(&mut buf)?;
            match el.tlv_type {
                t if t == tlv::TLV_NONCE => nonce = el.as_nonneg_integer()? as u32,
                t if t == tlv::TLV_INTEREST_LIFETIME => lifetime_ms = el.as_nonneg_integer()? as u32,
                t if t == tlv::TLV_CAN_BE_PREFIX => can_be_prefix = true,
                t if t == tlv::TLV_MUST_BE_FRESH => must_be_fresh = true,
                _ => {}
            }
        }

        Ok(Self {
            name,
            nonce,
            lifetime_ms,
            can_be_prefix,
            must_be_fresh,
        })
    }

    pub fn encode(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        self.to_tlv().encode(&mut buf);
        Ok(buf.freeze())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut buf = Bytes::copy_from_slice(bytes);
        let el = TlvElement::decode(&mut buf)?;
        Self::from_tlv(&el)
    }
}

/* ---------------------------------------------------------------- *\
 * Data
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub name: Name,
    pub content: Bytes,
    pub freshness_ms: u32,
    pub signature: Bytes,
}

impl Data {
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content: content.into(),
            freshness_ms: 4000,
            signature: Bytes::new(),
        }
    }

    pub fn empty(name: Name) -> Self {
        Self::new(name, Bytes::new())
    }

    pub fn with_freshness(mut self, freshness_ms: u32) -> Self {
        self.freshness_ms = freshness_ms;
        self
    }

    pub fn with_signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }

    /// The bytes a [`crate::keychain::KeyChain`] should sign: name + content
    /// + freshness, i.e. everything but the signature itself.
    pub fn signed_portion(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.name.to_tlv().encode(&mut buf);
        TlvElement::new(tlv::TLV_CONTENT, self.content.clone()).encode(&mut buf);
        TlvElement::nonneg_integer(tlv::TLV_FRESHNESS_PERIOD, self.freshness_ms as u64).encode(&mut buf);
        buf.freeze()
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&self.signed_portion());
        if !self.signature.is_empty() {
            TlvElement::new(tlv::TLV_SIGNATURE_VALUE, self.signature.clone()).encode(&mut buf);
        }
        TlvElement::new(tlv::TLV_DATA, buf.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        let element = element.clone().expect_type(tlv::TLV_DATA)?;
        let mut buf = element.value.clone();

        let name_el = TlvElement::decode(&mut buf)?;
        let name = Name::from_tlv(&name_el)?;

        let mut content = Bytes::new();
        let mut freshness_ms = 0u32;
        let mut signature = Bytes::new();

        while buf.has_remaining() {
            let el = TlvElement::decode(&mut buf)?;
            match el.tlv_type {
                t if t == tlv::TLV_CONTENT => content = el.value,
                t if t == tlv::TLV_FRESHNESS_PERIOD => freshness_ms = el.as_nonneg_integer()? as u32,
                t if t == tlv::TLV_SIGNATURE_VALUE => signature = el.value,
                _ => {}
            }
        }

        Ok(Self {
            name,
            content,
            freshness_ms,
            signature,
        })
    }

    pub fn encode(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        self.to_tlv().encode(&mut buf);
        Ok(buf.freeze())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut buf = Bytes::copy_from_slice(bytes);
        let el = TlvElement::decode(&mut buf)?;
        Self::from_tlv(&el)
    }
}

/* ---------------------------------------------------------------- *\
 * Nack
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackReason {
    Congestion,
    Duplicate,
    NoRoute,
}

impl NackReason {
    fn code(&self) -> u8 {
        match self {
            NackReason::Congestion => 50,
            NackReason::Duplicate => 100,
            NackReason::NoRoute => 150,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            50 => NackReason::Congestion,
            100 => NackReason::Duplicate,
            _ => NackReason::NoRoute,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nack {
    pub interest: Interest,
    pub reason: NackReason,
}

impl Nack {
    pub fn new(interest: Interest, reason: NackReason) -> Self {
        Self { interest, reason }
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut buf = BytesMut::new();
        self.interest.to_tlv().encode(&mut buf);
        TlvElement::nonneg_integer(tlv::TLV_NACK_REASON, self.reason.code() as u64).encode(&mut buf);
        TlvElement::new(tlv::TLV_NACK, buf.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        let element = element.clone().expect_type(tlv::TLV_NACK)?;
        let mut buf = element.value.clone();

        let interest_el = TlvElement::decode(&mut buf)?;
        let interest = Interest::from_tlv(&interest_el)?;

        let mut reason = NackReason::NoRoute;
        while buf.has_remaining() {
            let el = TlvElement::decode(&mut buf)?;
            if el.tlv_type == tlv::TLV_NACK_REASON {
                reason = NackReason::from_code(el.as_nonneg_integer()? as u8);
            }
        }

        Ok(Self { interest, reason })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.to_tlv().encode(&mut buf);
        buf.freeze()
    }
}

/// Tags the outer type of a decoded packet so a receive loop can demux
/// before committing to a full parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Interest,
    Data,
    Nack,
}

pub fn peek_kind(bytes: &[u8]) -> Option<PacketKind> {
    match bytes.first()? {
        t if *t == tlv::TLV_INTEREST => Some(PacketKind::Interest),
        t if *t == tlv::TLV_DATA => Some(PacketKind::Data),
        t if *t == tlv::TLV_NACK => Some(PacketKind::Nack),
        _ => None,
    }
}

/* ---------------------------------------------------------------- *\
 * Forwarder control parameters / status
\* ---------------------------------------------------------------- */

/// Status codes returned by the local forwarder's management protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    FaceExists,
    Other(u16),
}

impl StatusCode {
    pub fn from_u16(code: u16) -> Self {
        match code {
            200 => StatusCode::Ok,
            409 => StatusCode::FaceExists,
            other => StatusCode::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::FaceExists => 409,
            StatusCode::Other(o) => *o,
        }
    }

    /// Whether this status should be treated as a successful outcome by a
    /// `face_create` caller (§4.1: `FACE_EXISTS` is success for create).
    pub fn is_create_success(&self) -> bool {
        matches!(self, StatusCode::Ok | StatusCode::FaceExists)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

/// Route flags understood by `rib/register`. Only the two values this agent
/// ever installs are named; see §4.1 and §9 (Capture decided against).
pub const ROUTE_FLAG_CHILD_INHERIT: u64 = 0x01;

/// Default route origin used for routes this agent installs ("client").
pub const ORIGIN_CLIENT: u64 = 0xFF;

/// Control parameters carried in a command interest or its response,
/// per §3 "Forwarder Control Name". Fields are all optional because
/// different operations populate different subsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlParameters {
    pub name: Option<Name>,
    pub face_id: Option<u64>,
    pub uri: Option<String>,
    pub origin: Option<u64>,
    pub cost: Option<u64>,
    pub flags: Option<u64>,
    pub expiration_period_ms: Option<u64>,
    pub strategy: Option<Name>,
}

const TLV_CP_NAME: u8 = 0x07;
const TLV_CP_FACE_ID: u8 = 0x69;
const TLV_CP_URI: u8 = 0x72;
const TLV_CP_ORIGIN: u8 = 0x6f;
const TLV_CP_COST: u8 = 0x6a;
const TLV_CP_FLAGS: u8 = 0x6c;
const TLV_CP_EXPIRATION: u8 = 0x6d;
const TLV_CP_STRATEGY: u8 = 0x6b;
const TLV_CONTROL_PARAMETERS: u8 = 0x68;

impl ControlParameters {
    pub fn to_tlv(&self) -> TlvElement {
        let mut buf = BytesMut::new();
        if let Some(name) = &self.name {
            name.to_tlv().encode(&mut buf);
        }
        if let Some(face_id) = self.face_id {
            TlvElement::nonneg_integer(TLV_CP_FACE_ID, face_id).encode(&mut buf);
        }
        if let Some(uri) = &self.uri {
            TlvElement::new(TLV_CP_URI, Bytes::copy_from_slice(uri.as_bytes())).encode(&mut buf);
        }
        if let Some(origin) = self.origin {
            TlvElement::nonneg_integer(TLV_CP_ORIGIN, origin).encode(&mut buf);
        }
        if let Some(cost) = self.cost {
            TlvElement::nonneg_integer(TLV_CP_COST, cost).encode(&mut buf);
        }
        if let Some(flags) = self.flags {
            TlvElement::nonneg_integer(TLV_CP_FLAGS, flags).encode(&mut buf);
        }
        if let Some(exp) = self.expiration_period_ms {
            TlvElement::nonneg_integer(TLV_CP_EXPIRATION, exp).encode(&mut buf);
        }
        if let Some(strategy) = &self.strategy {
            let mut strategy_buf = BytesMut::new();
            strategy.to_tlv().encode(&mut strategy_buf);
            TlvElement::new(TLV_CP_STRATEGY, strategy_buf.freeze()).encode(&mut buf);
        }
        TlvElement::new(TLV_CONTROL_PARAMETERS, buf.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        let element = element.clone().expect_type(TLV_CONTROL_PARAMETERS)?;
        let mut buf = element.value.clone();
        let mut params = ControlParameters::default();

        while buf.has_remaining() {
            let el = TlvElement::decode(&mut buf)?;
            match el.tlv_type {
                t if t == TLV_CP_NAME => params.name = Some(Name::from_tlv(&el)?),
                t if t == TLV_CP_FACE_ID => params.face_id = Some(el.as_nonneg_integer()?),
                t if t == TLV_CP_URI => {
                    params.uri = Some(String::from_utf8_lossy(&el.value).into_owned());
                }
                t if t == TLV_CP_ORIGIN => params.origin = Some(el.as_nonneg_integer()?),
                t if t == TLV_CP_COST => params.cost = Some(el.as_nonneg_integer()?),
                t if t == TLV_CP_FLAGS => params.flags = Some(el.as_nonneg_integer()?),
                t if t == TLV_CP_EXPIRATION => params.expiration_period_ms = Some(el.as_nonneg_integer()?),
                t if t == TLV_CP_STRATEGY => {
                    let mut inner = el.value.clone();
                    let name_el = TlvElement::decode(&mut inner)?;
                    params.strategy = Some(Name::from_tlv(&name_el)?);
                }
                _ => {}
            }
        }

        Ok(params)
    }
}

/// A parsed forwarder management response: status code, human text, and an
/// echoed control-parameters block (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub status_code: StatusCode,
    pub status_text: String,
    pub parameters: ControlParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_round_trip_preserves_flags() {
        let interest = Interest::new(Name::from_string("/a/b"))
            .with_nonce(42)
            .with_lifetime(30_000)
            .with_can_be_prefix(true)
            .with_must_be_fresh(true);

        let encoded = interest.encode().unwrap();
        let decoded = Interest::decode(&encoded).unwrap();
        assert_eq!(decoded, interest);
    }

    #[test]
    fn data_round_trip_with_signature() {
        let data = Data::new(Name::from_string("/a/b"), Bytes::from_static(b"hello"))
            .with_freshness(4000)
            .with_signature(Bytes::from_static(b"sig-bytes"));

        let encoded = data.encode().unwrap();
        let decoded = Data::decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn empty_data_round_trips() {
        let data = Data::empty(Name::from_string("/a/nd-info"));
        let encoded = data.encode().unwrap();
        let decoded = Data::decode(&encoded).unwrap();
        assert_eq!(decoded.content.len(), 0);
        assert_eq!(decoded.name, data.name);
    }

    #[test]
    fn nack_round_trip() {
        let interest = Interest::new(Name::from_string("/a/b")).with_nonce(7);
        let nack = Nack::new(interest.clone(), NackReason::NoRoute);
        let encoded = nack.encode();
        let mut buf = encoded.clone();
        let el = TlvElement::decode(&mut buf).unwrap();
        let decoded = Nack::from_tlv(&el).unwrap();
        assert_eq!(decoded.interest, interest);
        assert_eq!(decoded.reason, NackReason::NoRoute);
    }

    #[test]
    fn peek_kind_distinguishes_packet_types() {
        let interest = Interest::new(Name::from_string("/a")).encode().unwrap();
        let data = Data::empty(Name::from_string("/a")).encode().unwrap();
        assert_eq!(peek_kind(&interest), Some(PacketKind::Interest));
        assert_eq!(peek_kind(&data), Some(PacketKind::Data));
    }

    #[test]
    fn control_parameters_round_trip() {
        let params = ControlParameters {
            name: Some(Name::from_string("/a/b")),
            face_id: Some(257),
            uri: Some("udp4://10.0.0.1:6363".to_string()),
            origin: Some(ORIGIN_CLIENT),
            cost: Some(0),
            flags: Some(ROUTE_FLAG_CHILD_INHERIT),
            expiration_period_ms: Some(30_000),
            strategy: Some(Name::from_string("/localhost/nfd/strategy/multicast")),
        };

        let tlv = params.to_tlv();
        let decoded = ControlParameters::from_tlv(&tlv).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn status_code_face_exists_is_create_success() {
        assert!(StatusCode::from_u16(409).is_create_success());
        assert!(StatusCode::from_u16(200).is_create_success());
        assert!(!StatusCode::from_u16(500).is_create_success());
    }
}
