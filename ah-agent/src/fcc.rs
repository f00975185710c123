//! Forwarder Control Client (§4.1).
//!
//! Builds signed command interests against the local forwarder's management
//! prefixes and parses its typed responses. The forwarder itself is an
//! external collaborator (§1): this module only knows the reserved prefixes
//! and the shape of control-parameters blocks, not how the forwarder
//! implements them.

use ah_common::keychain::KeyChain;
use ah_common::name::Name;
use ah_common::packet::{
    ControlParameters, ControlResponse, Data, Interest, StatusCode, ORIGIN_CLIENT, ROUTE_FLAG_CHILD_INHERIT,
};
use ah_common::tlv::{self, TlvElement};
use anyhow::{anyhow, Context, Result};
use ah_transport::{Face, FaceEvent};
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const FACES_CREATE: &str = "/localhost/nfd/faces/create";
pub const FACES_DESTROY: &str = "/localhost/nfd/faces/destroy";
pub const RIB_REGISTER: &str = "/localhost/nfd/rib/register";
pub const RIB_UNREGISTER: &str = "/localhost/nfd/rib/unregister";
pub const STRATEGY_CHOICE_SET: &str = "/localhost/nfd/strategy-choice/set";
pub const FACES_QUERY: &str = "/localhost/nfd/faces/list";
pub const RIB_LIST: &str = "/localhost/nfd/rib/list";

pub const MULTICAST_STRATEGY: &str = "/localhost/nfd/strategy/multicast";

pub const DEFAULT_ROUTE_COST: u64 = 0;
pub const MULTICAST_ROUTE_EXPIRATION_MS: u64 = 30_000;

/// Whether a dataset face is reachable only on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceScope {
    Local,
    NonLocal,
}

/// Whether a face reaches exactly one peer or a multicast-capable group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    PointToPoint,
    MultiAccess,
    AdHoc,
}

/// One entry of the forwarder's face dataset (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct FaceStatus {
    pub face_id: u64,
    pub remote_uri: String,
    pub local_uri: String,
    pub link_type: LinkType,
    pub face_scope: FaceScope,
    pub face_persistency: u64,
    pub flags: u64,
    pub in_interests: u64,
    pub out_interests: u64,
    pub in_bytes: u64,
    pub out_bytes: u64,
    pub in_data: u64,
    pub out_data: u64,
    pub in_nacks: u64,
    pub out_nacks: u64,
    pub mtu: Option<u64>,
    pub expiration_period_ms: Option<u64>,
}

/// One route entry of the forwarder's RIB dataset (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct RibEntry {
    pub name: Name,
    pub face_id: u64,
    pub origin: u64,
    pub cost: u64,
    pub flags: u64,
    pub expiration_period_ms: Option<u64>,
}

/// Builds, signs, and sends command interests against the local forwarder,
/// and fetches its face/RIB datasets.
pub struct Fcc {
    face: Arc<Face>,
    forwarder_addr: SocketAddr,
    keychain: Arc<dyn KeyChain>,
}

impl Fcc {
    pub fn new(face: Arc<Face>, forwarder_addr: SocketAddr, keychain: Arc<dyn KeyChain>) -> Self {
        Self { face, forwarder_addr, keychain }
    }

    async fn send_command(&self, verb: &str, params: &ControlParameters) -> Result<ControlResponse> {
        let mut name = Name::from_string(verb);
        name.push_bytes(params.to_tlv().value.to_vec());

        let signed = sign_command(&*self.keychain, &name);
        let interest = Interest::new(signed).with_must_be_fresh(true).with_lifetime(4000);

        let event = self
            .face
            .express_interest(self.forwarder_addr, interest)
            .await
            .with_context(|| format!("sending {verb} command"))?;

        match event {
            FaceEvent::Data(data) => parse_control_response(&data),
            FaceEvent::Nack(_) => Err(anyhow!("command interest for {verb} was NACKed")),
            FaceEvent::Timeout => Err(anyhow!("command interest for {verb} timed out")),
        }
    }

    /// `face_create(uri) -> face_id`. A `FACE_EXISTS` reply is success,
    /// yielding the already-existing face's id (§4.1).
    pub async fn face_create(&self, uri: &str) -> Result<u64> {
        let params = ControlParameters { uri: Some(uri.to_string()), ..Default::default() };
        let response = self.send_command(FACES_CREATE, &params).await?;
        if response.status_code.is_create_success() {
            response
                .parameters
                .face_id
                .ok_or_else(|| anyhow!("face_create response missing FaceId"))
        } else {
            Err(anyhow!("face_create failed: {}", response.status_text))
        }
    }

    pub async fn face_destroy(&self, face_id: u64) -> Result<()> {
        let params = ControlParameters { face_id: Some(face_id), ..Default::default() };
        let response = self.send_command(FACES_DESTROY, &params).await?;
        if response.status_code.is_ok() {
            Ok(())
        } else {
            Err(anyhow!("face_destroy failed: {}", response.status_text))
        }
    }

    /// Registers a route. `cost`/`flags` default to this agent's usual
    /// client-origin route (origin 0xFF, cost 0, ChildInherit) unless
    /// overridden by the caller.
    pub async fn rib_register(
        &self,
        name: &Name,
        face_id: u64,
        cost: u64,
        flags: u64,
        expiration_ms: Option<u64>,
    ) -> Result<()> {
        let params = ControlParameters {
            name: Some(name.clone()),
            face_id: Some(face_id),
            origin: Some(ORIGIN_CLIENT),
            cost: Some(cost),
            flags: Some(flags),
            expiration_period_ms: expiration_ms,
            ..Default::default()
        };
        let response = self.send_command(RIB_REGISTER, &params).await?;
        if response.status_code.is_ok() {
            Ok(())
        } else {
            Err(anyhow!("rib_register failed: {}", response.status_text))
        }
    }

    pub async fn rib_register_default(&self, name: &Name, face_id: u64) -> Result<()> {
        self.rib_register(name, face_id, DEFAULT_ROUTE_COST, ROUTE_FLAG_CHILD_INHERIT, None)
            .await
    }

    pub async fn rib_unregister(&self, name: &Name, face_id: u64) -> Result<()> {
        let params = ControlParameters {
            name: Some(name.clone()),
            face_id: Some(face_id),
            origin: Some(ORIGIN_CLIENT),
            ..Default::default()
        };
        let response = self.send_command(RIB_UNREGISTER, &params).await?;
        if response.status_code.is_ok() {
            Ok(())
        } else {
            Err(anyhow!("rib_unregister failed: {}", response.status_text))
        }
    }

    pub async fn strategy_set(&self, name: &Name, strategy: &Name) -> Result<()> {
        let params = ControlParameters {
            name: Some(name.clone()),
            strategy: Some(strategy.clone()),
            ..Default::default()
        };
        let response = self.send_command(STRATEGY_CHOICE_SET, &params).await?;
        if response.status_code.is_ok() {
            Ok(())
        } else {
            Err(anyhow!("strategy_set failed: {}", response.status_text))
        }
    }

    /// Fetches the forwarder's face dataset, optionally filtered to
    /// multi-access links only (used by Multicast Bootstrap, §4.3).
    pub async fn face_query(&self, multi_access_only: bool) -> Result<Vec<FaceStatus>> {
        let interest = Interest::new(Name::from_string(FACES_QUERY)).with_must_be_fresh(true);
        let event = self
            .face
            .express_interest(self.forwarder_addr, interest)
            .await
            .context("fetching face dataset")?;

        let data = match event {
            FaceEvent::Data(data) => data,
            FaceEvent::Nack(_) => return Err(anyhow!("face dataset query was NACKed")),
            FaceEvent::Timeout => return Err(anyhow!("face dataset query timed out")),
        };

        let faces = decode_face_dataset(&data.content)?;
        if multi_access_only {
            Ok(faces.into_iter().filter(|f| f.link_type == LinkType::MultiAccess).collect())
        } else {
            Ok(faces)
        }
    }

    pub async fn rib_fetch(&self) -> Result<Vec<RibEntry>> {
        let interest = Interest::new(Name::from_string(RIB_LIST)).with_must_be_fresh(true);
        let event = self
            .face
            .express_interest(self.forwarder_addr, interest)
            .await
            .context("fetching RIB dataset")?;

        let data = match event {
            FaceEvent::Data(data) => data,
            FaceEvent::Nack(_) => return Err(anyhow!("RIB dataset query was NACKed")),
            FaceEvent::Timeout => return Err(anyhow!("RIB dataset query timed out")),
        };

        decode_rib_dataset(&data.content)
    }
}

fn sign_command(keychain: &dyn KeyChain, unsigned_name: &Name) -> Name {
    let mut buf = BytesMut::new();
    unsigned_name.to_tlv().encode(&mut buf);
    let signature = keychain.sign(&buf);

    let mut signed = unsigned_name.clone();
    signed.push_bytes(keychain.key_locator().to_tlv().value.to_vec());
    signed.push_bytes(signature.as_bytes().to_vec());
    signed
}

fn parse_control_response(data: &Data) -> Result<ControlResponse> {
    // Response content: [status-code: u16][status-text][control-parameters TLV].
    let mut buf = data.content.clone();
    if buf.remaining() < 2 {
        return Err(anyhow!("control response too short"));
    }
    let status_code = StatusCode::from_u16(buf.get_u16());

    let text_el = TlvElement::decode(&mut buf).context("decoding status text")?;
    let status_text = String::from_utf8_lossy(&text_el.value).into_owned();

    let parameters = if buf.has_remaining() {
        let params_el = TlvElement::decode(&mut buf).context("decoding control parameters")?;
        ControlParameters::from_tlv(&params_el)?
    } else {
        ControlParameters::default()
    };

    Ok(ControlResponse { status_code, status_text, parameters })
}

const TLV_FACE_STATUS: u8 = 0x90;
const TLV_RIB_ENTRY: u8 = 0x91;
const TLV_ROUTE: u8 = 0x92;

fn decode_face_dataset(content: &Bytes) -> Result<Vec<FaceStatus>> {
    let mut buf = content.clone();
    let mut faces = Vec::new();
    while buf.has_remaining() {
        let el = TlvElement::decode(&mut buf)?;
        if el.tlv_type != TLV_FACE_STATUS {
            continue;
        }
        faces.push(decode_face_status(&el.value)?);
    }
    Ok(faces)
}

fn decode_face_status(value: &Bytes) -> Result<FaceStatus> {
    let mut buf = value.clone();
    let mut face_id = 0u64;
    let mut remote_uri = String::new();
    let mut local_uri = String::new();
    let mut link_type = LinkType::PointToPoint;
    let mut face_scope = FaceScope::NonLocal;
    let mut face_persistency = 0u64;
    let mut flags = 0u64;
    let (mut in_interests, mut out_interests) = (0u64, 0u64);
    let (mut in_bytes, mut out_bytes) = (0u64, 0u64);
    let (mut in_data, mut out_data) = (0u64, 0u64);
    let (mut in_nacks, mut out_nacks) = (0u64, 0u64);
    let mut mtu = None;
    let mut expiration_period_ms = None;

    let mut idx = 0u8;
    while buf.has_remaining() {
        let el = TlvElement::decode(&mut buf)?;
        match idx {
            0 => face_id = el.as_nonneg_integer()?,
            1 => remote_uri = String::from_utf8_lossy(&el.value).into_owned(),
            2 => local_uri = String::from_utf8_lossy(&el.value).into_owned(),
            3 => {
                link_type = match el.as_nonneg_integer()? {
                    1 => LinkType::MultiAccess,
                    2 => LinkType::AdHoc,
                    _ => LinkType::PointToPoint,
                }
            }
            4 => {
                face_scope = if el.as_nonneg_integer()? == 0 {
                    FaceScope::Local
                } else {
                    FaceScope::NonLocal
                }
            }
            5 => face_persistency = el.as_nonneg_integer()?,
            6 => flags = el.as_nonneg_integer()?,
            7 => in_interests = el.as_nonneg_integer()?,
            8 => out_interests = el.as_nonneg_integer()?,
            9 => in_bytes = el.as_nonneg_integer()?,
            10 => out_bytes = el.as_nonneg_integer()?,
            11 => in_data = el.as_nonneg_integer()?,
            12 => out_data = el.as_nonneg_integer()?,
            13 => in_nacks = el.as_nonneg_integer()?,
            14 => out_nacks = el.as_nonneg_integer()?,
            15 => mtu = Some(el.as_nonneg_integer()?),
            16 => expiration_period_ms = Some(el.as_nonneg_integer()?),
            _ => {}
        }
        idx += 1;
    }

    Ok(FaceStatus {
        face_id,
        remote_uri,
        local_uri,
        link_type,
        face_scope,
        face_persistency,
        flags,
        in_interests,
        out_interests,
        in_bytes,
        out_bytes,
        in_data,
        out_data,
        in_nacks,
        out_nacks,
        mtu,
        expiration_period_ms,
    })
}

fn decode_rib_dataset(content: &Bytes) -> Result<Vec<RibEntry>> {
    let mut buf = content.clone();
    let mut entries = Vec::new();
    while buf.has_remaining() {
        let el = TlvElement::decode(&mut buf)?;
        if el.tlv_type != TLV_RIB_ENTRY {
            continue;
        }

        let mut inner = el.value.clone();
        let name_el = TlvElement::decode(&mut inner)?;
        let name = Name::from_tlv(&name_el)?;

        while inner.has_remaining() {
            let route_el = TlvElement::decode(&mut inner)?;
            if route_el.tlv_type != TLV_ROUTE {
                continue;
            }
            let mut route_buf = route_el.value.clone();
            let mut idx = 0u8;
            let (mut face_id, mut origin, mut cost, mut flags) = (0u64, 0u64, 0u64, 0u64);
            let mut expiration_period_ms = None;
            while route_buf.has_remaining() {
                let f = TlvElement::decode(&mut route_buf)?;
                match idx {
                    0 => face_id = f.as_nonneg_integer()?,
                    1 => origin = f.as_nonneg_integer()?,
                    2 => cost = f.as_nonneg_integer()?,
                    3 => flags = f.as_nonneg_integer()?,
                    4 => expiration_period_ms = Some(f.as_nonneg_integer()?),
                    _ => {}
                }
                idx += 1;
            }
            entries.push(RibEntry { name: name.clone(), face_id, origin, cost, flags, expiration_period_ms });
        }
    }
    Ok(entries)
}

pub fn udp_face_uri(addr: SocketAddr) -> String {
    format!("udp4://{}:{}", addr.ip(), addr.port())
}

pub fn default_interest_lifetime() -> Duration {
    Duration::from_millis(4000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_face_uri_formats_correctly() {
        let addr: SocketAddr = "10.0.0.1:6363".parse().unwrap();
        assert_eq!(udp_face_uri(addr), "udp4://10.0.0.1:6363");
    }

    #[test]
    fn parse_control_response_round_trips() {
        let params = ControlParameters { face_id: Some(12), ..Default::default() };
        let mut content = BytesMut::new();
        content.extend_from_slice(&200u16.to_be_bytes());
        TlvElement::new(tlv::TLV_CONTENT, Bytes::from_static(b"OK")).encode(&mut content);
        params.to_tlv().encode(&mut content);

        let data = Data::new(Name::from_string("/localhost/nfd/faces/create"), content.freeze());
        let response = parse_control_response(&data).unwrap();
        assert!(response.status_code.is_ok());
        assert_eq!(response.parameters.face_id, Some(12));
    }

    #[test]
    fn decode_face_dataset_round_trips_one_face() {
        let mut face_buf = BytesMut::new();
        TlvElement::nonneg_integer(0, 7).encode(&mut face_buf);
        TlvElement::new(0, Bytes::from_static(b"udp4://10.0.0.2:6363")).encode(&mut face_buf);
        TlvElement::new(0, Bytes::from_static(b"udp4://10.0.0.1:6363")).encode(&mut face_buf);
        TlvElement::nonneg_integer(0, 1).encode(&mut face_buf); // multi-access
        TlvElement::nonneg_integer(0, 1).encode(&mut face_buf); // non-local

        let mut content = BytesMut::new();
        TlvElement::new(TLV_FACE_STATUS, face_buf.freeze()).encode(&mut content);

        let faces = decode_face_dataset(&content.freeze()).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].face_id, 7);
        assert_eq!(faces[0].link_type, LinkType::MultiAccess);
    }
}
