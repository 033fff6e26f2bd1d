//! UTXO-style transactions.
//!
//! A transaction spends a set of named outputs (`inputs`) and creates a new
//! set of outputs. Its `number` is a content hash over the canonical form of
//! its inputs, outputs and signature, so that the transaction is
//! self-identifying the same way a block is (see [`crate::model::block`]).

use crate::primitives::{self, Hash, Keypair, Pubkey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// A single output: a bounty of `value` coins payable to `pubkey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
  pub value: u64,
  pub pubkey: Pubkey,
}

/// A reference to a previously created output, named by the transaction
/// that produced it and the exact `(value, pubkey)` pair being spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
  pub ref_number: Hash,
  pub output: Output,
}

/// A value transfer: spends `inputs`, creates `outputs`, and is signed by
/// the single shared signer of its inputs.
///
/// Boundary transactions (the genesis transaction and the ones generated by
/// split/merge) carry no `inputs` and are never checked for a valid Ed25519
/// signature — see [`crate::consensus::validator`] policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
  pub number: Hash,
  pub inputs: Vec<Input>,
  pub outputs: Vec<Output>,
  /// Hex-encoded signature bytes. For NORMAL and FEE transactions this is a
  /// real Ed25519 signature over [`Transaction::signing_payload`]. For
  /// GENESIS/SPLIT/MERGE boundary transactions it is a hash placeholder
  /// (matching the original implementation's `writeSplitTransaction` et
  /// al., which sign nothing and just hash the payload).
  pub signature: String,
}

#[derive(Debug, Error)]
pub enum TransactionParseError {
  #[error("malformed canonical transaction json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("canonical transaction json has the wrong shape")]
  Shape,
}

impl Transaction {
  /// The byte string `canonical(inputs) ‖ canonical(outputs)` that is both
  /// signed (for NORMAL/FEE transactions) and hashed into `number`.
  pub fn signing_payload(inputs: &[Input], outputs: &[Output]) -> Vec<u8> {
    let mut s = String::new();
    for input in inputs {
      s.push_str(&input.ref_number.to_string());
      s.push_str(&input.output.value.to_string());
      s.push_str(&input.output.pubkey.to_string());
    }
    for output in outputs {
      s.push_str(&output.value.to_string());
      s.push_str(&output.pubkey.to_string());
    }
    s.into_bytes()
  }

  fn compute_number(inputs: &[Input], outputs: &[Output], signature: &str) -> Hash {
    let mut payload = Self::signing_payload(inputs, outputs);
    payload.extend_from_slice(signature.as_bytes());
    Hash::digest(payload)
  }

  /// Builds and signs a NORMAL (or FEE) transaction with a real Ed25519
  /// signature from the shared signer of its inputs.
  pub fn new_signed(inputs: Vec<Input>, outputs: Vec<Output>, signer: &Keypair) -> Self {
    let payload = Self::signing_payload(&inputs, &outputs);
    let signature = primitives::signature_to_hex(&signer.sign(&payload));
    let number = Self::compute_number(&inputs, &outputs, &signature);
    Self { number, inputs, outputs, signature }
  }

  /// Builds a boundary transaction (GENESIS/SPLIT/MERGE): no real signer,
  /// the "signature" field is a hash of the payload, and the hash-integrity
  /// equation in the validator still holds over whatever ends up there.
  pub fn new_boundary(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
    let payload = Self::signing_payload(&inputs, &outputs);
    let signature = Hash::digest(&payload).to_string();
    let number = Self::compute_number(&inputs, &outputs, &signature);
    Self { number, inputs, outputs, signature }
  }

  /// Recomputes `number` from the transaction's other fields. Used by the
  /// validator's hash-integrity check.
  pub fn recompute_number(&self) -> Hash {
    Self::compute_number(&self.inputs, &self.outputs, &self.signature)
  }

  pub fn sum_inputs(&self) -> u128 {
    self.inputs.iter().map(|i| i.output.value as u128).sum()
  }

  pub fn sum_outputs(&self) -> u128 {
    self.outputs.iter().map(|o| o.value as u128).sum()
  }

  /// The pubkey shared by all inputs, or `None` if there are no inputs or
  /// they disagree (single-signer invariant violated).
  pub fn sole_signer(&self) -> Option<Pubkey> {
    let first = self.inputs.first()?.output.pubkey;
    self
      .inputs
      .iter()
      .all(|i| i.output.pubkey == first)
      .then_some(first)
  }

  /// Serializes this transaction to the canonical JSON list form
  /// `[number, inputs, outputs, signature]` used both as a block's `tx`
  /// payload and as the input to the block hash.
  pub fn to_canonical_json(&self) -> String {
    let inputs: Vec<Value> = self
      .inputs
      .iter()
      .map(|i| json!([i.ref_number.to_string(), i.output.value, i.output.pubkey.to_string()]))
      .collect();
    let outputs: Vec<Value> = self
      .outputs
      .iter()
      .map(|o| json!([o.value, o.pubkey.to_string()]))
      .collect();
    let arr = json!([self.number.to_string(), inputs, outputs, self.signature]);
    serde_json::to_string(&arr).expect("json arrays always serialize")
  }

  /// Parses the canonical JSON list form back into a transaction. This is
  /// the inverse of [`Transaction::to_canonical_json`].
  pub fn from_canonical_json(s: &str) -> Result<Self, TransactionParseError> {
    let v: Value = serde_json::from_str(s)?;
    let arr = v.as_array().ok_or(TransactionParseError::Shape)?;
    if arr.len() != 4 {
      return Err(TransactionParseError::Shape);
    }

    let number: Hash = arr[0].as_str().ok_or(TransactionParseError::Shape)?.parse().map_err(|_| TransactionParseError::Shape)?;

    let inputs = arr[1]
      .as_array()
      .ok_or(TransactionParseError::Shape)?
      .iter()
      .map(|v| {
        let t = v.as_array().filter(|t| t.len() == 3).ok_or(TransactionParseError::Shape)?;
        let ref_number: Hash = t[0].as_str().ok_or(TransactionParseError::Shape)?.parse().map_err(|_| TransactionParseError::Shape)?;
        let value = t[1].as_u64().ok_or(TransactionParseError::Shape)?;
        let pubkey: Pubkey = t[2].as_str().ok_or(TransactionParseError::Shape)?.parse().map_err(|_| TransactionParseError::Shape)?;
        Ok(Input { ref_number, output: Output { value, pubkey } })
      })
      .collect::<Result<Vec<_>, TransactionParseError>>()?;

    let outputs = arr[2]
      .as_array()
      .ok_or(TransactionParseError::Shape)?
      .iter()
      .map(|v| {
        let t = v.as_array().filter(|t| t.len() == 2).ok_or(TransactionParseError::Shape)?;
        let value = t[0].as_u64().ok_or(TransactionParseError::Shape)?;
        let pubkey: Pubkey = t[1].as_str().ok_or(TransactionParseError::Shape)?.parse().map_err(|_| TransactionParseError::Shape)?;
        Ok(Output { value, pubkey })
      })
      .collect::<Result<Vec<_>, TransactionParseError>>()?;

    let signature = arr[3].as_str().ok_or(TransactionParseError::Shape)?.to_owned();

    Ok(Self { number, inputs, outputs, signature })
  }
}

impl std::fmt::Display for Transaction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "tx({})", self.number)
  }
}
