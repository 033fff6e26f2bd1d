//! Content-addressing primitives.
//!
//! Blocks and transactions are identified by a 256-bit digest of their
//! canonical serialized form. The digest algorithm is SHA-256, matching the
//! reference implementation this simulator's protocol was distilled from.

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

/// A 256-bit content digest used as the identifier for blocks and
/// transaction numbers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
  /// Hashes a byte string and wraps the digest.
  pub fn digest(bytes: impl AsRef<[u8]>) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    let out = hasher.finalize();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    Self(buf)
  }

  /// A zero-filled placeholder hash, used as the `prev` of a genesis block
  /// before the block is actually hashed.
  pub const fn zero() -> Self {
    Self([0u8; 32])
  }

  /// Derives an arbitrary-looking but deterministic placeholder hash from a
  /// seeded RNG, used as the genesis block's dangling `prev` pointer. This
  /// plays the role of the original implementation's random decimal nonce.
  pub fn random(rng: &mut impl rand::RngCore) -> Self {
    let mut buf = [0u8; 32];
    rng.fill_bytes(&mut buf);
    Self(buf)
  }

  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl AsRef<[u8]> for Hash {
  fn as_ref(&self) -> &[u8] {
    &self.0
  }
}

impl fmt::Display for Hash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", hex::encode(self.0))
  }
}

impl fmt::Debug for Hash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Hash({})", hex::encode(self.0))
  }
}

#[derive(Debug, thiserror::Error)]
pub enum HashParseError {
  #[error("invalid hex string: {0}")]
  Hex(#[from] hex::FromHexError),

  #[error("expected 32 bytes, got {0}")]
  WrongLength(usize),
}

impl FromStr for Hash {
  type Err = HashParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
      return Err(HashParseError::WrongLength(bytes.len()));
    }
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&bytes);
    Ok(Self(buf))
  }
}

impl Serialize for Hash {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for Hash {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(D::Error::custom)
  }
}
