//! Interest/data signing.
//!
//! The keystore itself — key storage, rotation, identity issuance — stays
//! out of scope (§1): `KeyChain` is a trait any conforming signer can
//! implement. [`HmacKeyChain`] is the one concrete implementation this crate
//! ships, backed by `ring`'s HMAC-SHA256, generating its key at construction
//! time rather than reading it from a persisted identity store.

use crate::name::Name;
use bytes::Bytes;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};

/// A signature over a signed interest or data packet's signed portion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureValue(pub Bytes);

impl SignatureValue {
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

/// Produces signatures for outgoing command interests and response data
/// packets, and names the key used (§4.1).
pub trait KeyChain: Send + Sync {
    fn sign(&self, signed_bytes: &[u8]) -> SignatureValue;
    fn verify(&self, signed_bytes: &[u8], signature: &SignatureValue) -> bool;
    fn key_locator(&self) -> Name;
}

/// HMAC-SHA256 signer over a key generated once at construction.
pub struct HmacKeyChain {
    key: hmac::Key,
    locator: Name,
}

impl HmacKeyChain {
    /// Generates a fresh 256-bit key via `ring`'s CSPRNG.
    pub fn generate(locator: Name) -> Result<Self, ring::error::Unspecified> {
        let rng = SystemRandom::new();
        let mut key_bytes = [0u8; 32];
        rng.fill(&mut key_bytes)?;
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, &key_bytes),
            locator,
        })
    }

    /// Builds a signer from an existing key, e.g. one supplied by an
    /// external keystore.
    pub fn from_key_bytes(key_bytes: &[u8], locator: Name) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, key_bytes),
            locator,
        }
    }
}

impl KeyChain for HmacKeyChain {
    fn sign(&self, signed_bytes: &[u8]) -> SignatureValue {
        let tag = hmac::sign(&self.key, signed_bytes);
        SignatureValue(Bytes::copy_from_slice(tag.as_ref()))
    }

    fn verify(&self, signed_bytes: &[u8], signature: &SignatureValue) -> bool {
        hmac::verify(&self.key, signed_bytes, signature.as_bytes()).is_ok()
    }

    fn key_locator(&self) -> Name {
        self.locator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_succeeds() {
        let kc = HmacKeyChain::generate(Name::from_string("/agent/KEY")).unwrap();
        let sig = kc.sign(b"some signed bytes");
        assert!(kc.verify(b"some signed bytes", &sig));
    }

    #[test]
    fn verify_rejects_tampered_bytes() {
        let kc = HmacKeyChain::generate(Name::from_string("/agent/KEY")).unwrap();
        let sig = kc.sign(b"original");
        assert!(!kc.verify(b"tampered", &sig));
    }

    #[test]
    fn different_keys_produce_different_signatures() {
        let a = HmacKeyChain::generate(Name::from_string("/agent/KEY")).unwrap();
        let b = HmacKeyChain::generate(Name::from_string("/agent/KEY")).unwrap();
        assert_ne!(a.sign(b"x").0, b.sign(b"x").0);
    }
}
