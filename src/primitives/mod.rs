mod hash;
mod keys;

pub use hash::{Hash, HashParseError};
pub use keys::{
  parse_signature, signature_to_hex, verify, Keypair, KeypairParseError, Pubkey,
  PubkeyParseError,
};
