//! Blocks: the append-only units that carry transactions onto a community's
//! chain.
//!
//! A block's hash covers only `[tx, prev]` — the serialized transaction and
//! the parent hash — never `kind` or `prev2`. This matches the reference
//! implementation's `serializeBlock`, which ignores the `isGenesis` /
//! `isFee` / `isSplit` / `isMerge` flags and the merge's second parent when
//! computing identity.

use crate::model::Transaction;
use crate::primitives::Hash;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// What role a block plays on its chain. Only `Normal` blocks are held to
/// the full signature + conservation policy (see
/// [`crate::consensus::validator`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
  /// The first block of a community's chain.
  Genesis,
  /// An ordinary value-transfer block proposed by a forger.
  Normal,
  /// Carries the accrued merge/split fee paid to a block's creator.
  Fee,
  /// The chain-splicing boundary block created when two communities merge.
  Merge,
  /// The boundary block created when a community splits into two.
  Split,
}

impl BlockKind {
  /// `Fee`, `Split` and `Merge` blocks skip the single-signer signature
  /// check and the conservation check (policy steps 5 and 7); `Genesis`
  /// blocks never reach the validator at all (see
  /// [`crate::consensus::chain::Chain::set_genesis`]).
  pub fn skips_signature_and_conservation(self) -> bool {
    matches!(self, BlockKind::Fee | BlockKind::Split | BlockKind::Merge)
  }

  pub fn allows_empty_inputs(self) -> bool {
    matches!(self, BlockKind::Genesis | BlockKind::Fee | BlockKind::Split | BlockKind::Merge)
  }
}

/// A block on a community's chain.
#[derive(Debug, Clone)]
pub struct Block {
  /// The canonical-JSON-serialized transaction this block carries.
  pub tx: String,
  pub prev: Hash,
  pub kind: BlockKind,
  /// The merge boundary block's second parent: the head of the other
  /// community's chain being folded in. `None` for every other kind.
  pub prev2: Option<Hash>,
}

impl Block {
  pub fn new(transaction: &Transaction, prev: Hash, kind: BlockKind, prev2: Option<Hash>) -> Self {
    Self { tx: transaction.to_canonical_json(), prev, kind, prev2 }
  }

  /// Deserializes the carried transaction. Blocks only ever store the
  /// canonical JSON form, so this should not fail for a block that was
  /// constructed through [`Block::new`].
  pub fn transaction(&self) -> Result<Transaction, super::transaction::TransactionParseError> {
    Transaction::from_canonical_json(&self.tx)
  }

  /// The canonical JSON list form `[tx, prev]` that this block's hash
  /// covers.
  pub fn canonical_json(&self) -> String {
    let arr = json!([self.tx, self.prev.to_string()]);
    serde_json::to_string(&arr).expect("json arrays always serialize")
  }

  pub fn hash(&self) -> Hash {
    Hash::digest(self.canonical_json())
  }
}
