//! NDN names and the discovery-name wire format.
//!
//! `Name`/`NameComponent` are the general-purpose NDN name types every other
//! packet type is built from. [`DiscoveryName`] and its codec functions layer
//! the agent's own `<broadcast-or-peer-prefix>/<verb>/<ip>/<port>/<n>/<prefix
//! components>/<timestamp>` convention on top, used by the discovery engine
//! to announce and recognize arrival/departure/info exchanges.

use crate::error::Error;
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length of a single name component.
pub const MAX_NAME_COMPONENT_LENGTH: usize = 255;
/// Maximum number of components in a name.
pub const MAX_NAME_COMPONENTS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameComponent(pub Bytes);

impl NameComponent {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn to_tlv(&self) -> TlvElement {
        TlvElement::new(tlv::TLV_COMPONENT, self.0.clone())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_COMPONENT {
            return Err(Error::NdnPacket(format!(
                "expected name component TLV type {}, got {}",
                tlv::TLV_COMPONENT,
                element.tlv_type
            )));
        }
        Ok(Self(element.value.clone()))
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = self.0.iter().all(|&b| b.is_ascii_graphic() || b == b' ');
        if printable {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "0x")?;
            for &b in &self.0 {
                write!(f, "{b:02x}")?;
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self { components: Vec::new() }
    }

    pub fn from_string(s: &str) -> Self {
        let components = s
            .split('/')
            .filter(|comp| !comp.is_empty())
            .map(|comp| NameComponent::new(comp.as_bytes().to_vec()))
            .collect();
        Self { components }
    }

    pub fn push(&mut self, component: NameComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    pub fn push_str(&mut self, s: &str) -> &mut Self {
        self.push(NameComponent::new(s.as_bytes().to_vec()))
    }

    pub fn push_bytes(&mut self, bytes: impl Into<Bytes>) -> &mut Self {
        self.push(NameComponent::new(bytes))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.components.iter()
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    /// Returns the first `len` components as a new name.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
        }
    }

    /// Returns the components from `start` up to (excluding) `start + len`.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        Self {
            components: self.components.iter().skip(start).take(len).cloned().collect(),
        }
    }

    pub fn append(&mut self, other: &Name) -> &mut Self {
        self.components.extend(other.components.iter().cloned());
        self
    }

    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.components.len() <= other.components.len()
            && self.components.iter().zip(other.components.iter()).all(|(a, b)| a == b)
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut buf = BytesMut::new();
        for component in &self.components {
            component.to_tlv().encode(&mut buf);
        }
        TlvElement::new(tlv::TLV_NAME, buf.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_NAME {
            return Err(Error::NdnPacket(format!(
                "expected name TLV type {}, got {}",
                tlv::TLV_NAME,
                element.tlv_type
            )));
        }

        let mut components = Vec::new();
        let mut buf = element.value.clone();
        while buf.has_remaining() {
            let e = TlvElement::decode(&mut buf)?;
            components.push(NameComponent::from_tlv(&e)?);
        }
        Ok(Self { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

/// The verb carried as the component immediately following a name's prefix
/// in the discovery-name convention (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryVerb {
    Arrival,
    Departure,
    NdInfo,
    NdKeepalive,
    Ping,
    NdStatus,
}

impl DiscoveryVerb {
    fn as_str(&self) -> &'static str {
        match self {
            DiscoveryVerb::Arrival => "arrival",
            DiscoveryVerb::Departure => "departure",
            DiscoveryVerb::NdInfo => "nd-info",
            DiscoveryVerb::NdKeepalive => "nd-keepalive",
            DiscoveryVerb::Ping => "ping",
            DiscoveryVerb::NdStatus => "nd-status",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "arrival" => DiscoveryVerb::Arrival,
            "departure" => DiscoveryVerb::Departure,
            "nd-info" => DiscoveryVerb::NdInfo,
            "nd-keepalive" => DiscoveryVerb::NdKeepalive,
            "ping" => DiscoveryVerb::Ping,
            "nd-status" => DiscoveryVerb::NdStatus,
            _ => return None,
        })
    }
}

/// A decoded discovery name: `<base>/<verb>/<ip>/<port>/<n>/<prefix...>/<timestamp>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryName {
    pub verb: DiscoveryVerbOwned,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub prefix: Name,
}

/// Owned copy of [`DiscoveryVerb`] so callers can match/store it without
/// threading a lifetime through.
pub type DiscoveryVerbOwned = DiscoveryVerb;

/// Builds a discovery name under `base` (the broadcast prefix for arrival/
/// departure, or a peer's own prefix for direct nd-info/nd-keepalive/ping/
/// nd-status exchanges).
///
/// Layout: `<base>/<verb>/<ip-bytes:16>/<port-bytes:2>/<prefix-len:1>/<prefix
/// components>/<timestamp>`. The IP is padded into a 16-byte field for
/// forward compatibility with IPv6, per §3.
pub fn build_discovery_name(base: &Name, verb: DiscoveryVerb, ip: Ipv4Addr, port: u16, prefix: &Name) -> Name {
    let mut name = base.clone();
    name.push_str(verb.as_str());

    let mut ip_field = [0u8; 16];
    ip_field[..4].copy_from_slice(&ip.octets());
    name.push_bytes(ip_field.to_vec());

    name.push_bytes(port.to_be_bytes().to_vec());

    let prefix_len = prefix.len();
    if prefix_len > u8::MAX as usize {
        // Truncated defensively; callers are expected never to exceed this.
        name.push_bytes(vec![u8::MAX]);
    } else {
        name.push_bytes(vec![prefix_len as u8]);
    }

    name.append(prefix);

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    name.push_bytes(now_ms.to_be_bytes().to_vec());

    name
}

/// Scans `name` left to right for a verb marker, then decodes the IP, port,
/// prefix-length, and prefix components that follow it. The trailing
/// timestamp is ignored for equality (§4.2).
pub fn decode_discovery_name(name: &Name) -> Result<DiscoveryName, Error> {
    let components: Vec<&NameComponent> = name.components().collect();

    let verb_idx = components
        .iter()
        .position(|c| {
            std::str::from_utf8(c.as_bytes())
                .ok()
                .and_then(DiscoveryVerb::from_str)
                .is_some()
        })
        .ok_or_else(|| Error::NdnPacket("discovery name has no verb component".into()))?;

    let verb = std::str::from_utf8(components[verb_idx].as_bytes())
        .ok()
        .and_then(DiscoveryVerb::from_str)
        .expect("verified above");

    let ip_comp = components
        .get(verb_idx + 1)
        .ok_or_else(|| Error::NdnPacket("discovery name missing ip component".into()))?;
    if ip_comp.as_bytes().len() < 4 {
        return Err(Error::NdnPacket("discovery name ip component too short".into()));
    }
    let ip = Ipv4Addr::new(
        ip_comp.as_bytes()[0],
        ip_comp.as_bytes()[1],
        ip_comp.as_bytes()[2],
        ip_comp.as_bytes()[3],
    );

    let port_comp = components
        .get(verb_idx + 2)
        .ok_or_else(|| Error::NdnPacket("discovery name missing port component".into()))?;
    if port_comp.as_bytes().len() != 2 {
        return Err(Error::NdnPacket("discovery name port component malformed".into()));
    }
    let port = u16::from_be_bytes([port_comp.as_bytes()[0], port_comp.as_bytes()[1]]);

    let len_comp = components
        .get(verb_idx + 3)
        .ok_or_else(|| Error::NdnPacket("discovery name missing prefix-length component".into()))?;
    if len_comp.as_bytes().len() != 1 {
        return Err(Error::NdnPacket("discovery name prefix-length component malformed".into()));
    }
    let prefix_len = len_comp.as_bytes()[0] as usize;

    let prefix_start = verb_idx + 4;
    if components.len() < prefix_start + prefix_len {
        return Err(Error::NdnPacket("discovery name truncated before end of prefix".into()));
    }
    let prefix = Name {
        components: components[prefix_start..prefix_start + prefix_len]
            .iter()
            .map(|c| (*c).clone())
            .collect(),
    };

    Ok(DiscoveryName { verb, ip, port, prefix })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_display_and_from_string_round_trip() {
        let n = Name::from_string("/localhost/nfd/faces/create");
        assert_eq!(n.len(), 4);
        assert_eq!(n.to_string(), "/localhost/nfd/faces/create");
    }

    #[test]
    fn name_tlv_round_trip() {
        let n = Name::from_string("/a/b/c");
        let tlv = n.to_tlv();
        let decoded = Name::from_tlv(&tlv).unwrap();
        assert_eq!(decoded, n);
    }

    #[test]
    fn discovery_name_round_trips_verb_ip_port_prefix() {
        let base = Name::from_string("/localhop/ndn-autoconf/ah");
        let prefix = Name::from_string("/node-b");
        let ip = Ipv4Addr::new(10, 0, 0, 7);
        let built = build_discovery_name(&base, DiscoveryVerb::Arrival, ip, 6363, &prefix);

        let decoded = decode_discovery_name(&built).unwrap();
        assert_eq!(decoded.verb, DiscoveryVerb::Arrival);
        assert_eq!(decoded.ip, ip);
        assert_eq!(decoded.port, 6363);
        assert_eq!(decoded.prefix, prefix);
    }

    #[test]
    fn decode_rejects_name_without_verb() {
        let name = Name::from_string("/no/verb/here");
        assert!(decode_discovery_name(&name).is_err());
    }

    #[test]
    fn is_prefix_of() {
        let a = Name::from_string("/a/b");
        let b = Name::from_string("/a/b/c");
        assert!(a.is_prefix_of(&b));
        assert!(!b.is_prefix_of(&a));
    }
}
