//! Account identity: public/private keypairs on the Ed25519 curve.
//!
//! Unlike `rensa`'s account model (base58, derivable program addresses),
//! transactions in this simulator carry hex-encoded keys, matching the wire
//! format of the input bundle (see [`crate::io`]).

use ed25519_dalek::{PublicKey, SecretKey, Signature, Signer, Verifier};
use serde::{
  de::{self, Visitor},
  Deserialize, Deserializer, Serialize, Serializer,
};
use std::{
  fmt::{self, Debug, Display, Formatter},
  ops::Deref,
  str::FromStr,
};
use thiserror::Error;

/// A public key identifying a transaction signer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pubkey([u8; 32]);

impl Deref for Pubkey {
  type Target = [u8];
  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl Display for Pubkey {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}", hex::encode(self.0))
  }
}

impl Debug for Pubkey {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "Pubkey({})", hex::encode(self.0))
  }
}

#[derive(Debug, Error)]
pub enum PubkeyParseError {
  #[error("invalid hex string: {0}")]
  Hex(#[from] hex::FromHexError),

  #[error("expected 32 bytes, got {0}")]
  WrongLength(usize),
}

impl FromStr for Pubkey {
  type Err = PubkeyParseError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
      return Err(PubkeyParseError::WrongLength(bytes.len()));
    }
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&bytes);
    Ok(Self(buf))
  }
}

impl From<PublicKey> for Pubkey {
  fn from(p: PublicKey) -> Self {
    Self(*p.as_bytes())
  }
}

impl Serialize for Pubkey {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for Pubkey {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct HexVisitor;
    impl<'de> Visitor<'de> for HexVisitor {
      type Value = Pubkey;
      fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a hex-encoded 32 byte public key")
      }
      fn visit_str<E: de::Error>(self, v: &str) -> Result<Pubkey, E> {
        v.parse().map_err(de::Error::custom)
      }
    }
    deserializer.deserialize_str(HexVisitor)
  }
}

/// A signing keypair for a forger or a transaction's signer.
pub struct Keypair(ed25519_dalek::Keypair);

impl Keypair {
  pub fn public(&self) -> Pubkey {
    self.0.public.into()
  }

  /// Signs an arbitrary message, producing the bytes that belong in a
  /// transaction's `signature` field.
  pub fn sign(&self, message: &[u8]) -> Signature {
    self.0.sign(message)
  }
}

impl Clone for Keypair {
  fn clone(&self) -> Self {
    Self(ed25519_dalek::Keypair::from_bytes(&self.0.to_bytes()).unwrap())
  }
}

impl Debug for Keypair {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Keypair").field(&Pubkey::from(self.0.public)).finish()
  }
}

#[derive(Debug, Error)]
pub enum KeypairParseError {
  #[error("invalid hex string: {0}")]
  Hex(#[from] hex::FromHexError),

  #[error("{0}")]
  Ed25519(#[from] ed25519_dalek::ed25519::Error),
}

impl TryFrom<&[u8]> for Keypair {
  type Error = KeypairParseError;
  fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
    let secret = SecretKey::from_bytes(value)?;
    let public: PublicKey = (&secret).into();
    Ok(Self(ed25519_dalek::Keypair { secret, public }))
  }
}

impl FromStr for Keypair {
  type Err = KeypairParseError;
  fn from_str(value: &str) -> Result<Self, Self::Err> {
    let bytes = hex::decode(value)?;
    Ok(bytes.as_slice().try_into()?)
  }
}

/// Verifies a detached signature over a message for a given public key.
/// Returns `false` on any malformed input rather than propagating an error:
/// signature checks are a normal control outcome, not an error condition
/// (see `spec.md` §7, "Transient").
pub fn verify(pubkey: &Pubkey, message: &[u8], signature: &Signature) -> bool {
  match PublicKey::from_bytes(&pubkey.0) {
    Ok(pk) => pk.verify(message, signature).is_ok(),
    Err(_) => false,
  }
}

/// Parses a hex-encoded signature, used when decoding transactions off the
/// wire. Malformed signatures are surfaced as `None` so callers can treat
/// them as a validation failure rather than a hard parse error.
pub fn parse_signature(hex_sig: &str) -> Option<Signature> {
  let bytes = hex::decode(hex_sig).ok()?;
  Signature::from_bytes(&bytes).ok()
}

pub fn signature_to_hex(sig: &Signature) -> String {
  hex::encode(sig.to_bytes())
}
