//! Error taxonomy.
//!
//! Mirrors the policy split in the specification: malformed input aborts the
//! run, a rejected block is a local, non-fatal outcome reported by the
//! broadcasting community, and a conservation mismatch during a merge/split
//! is treated as a hard bug and aborts the operation rather than being
//! silently absorbed.

use crate::primitives::Hash;
use thiserror::Error;

/// Malformed startup input: bad JSON, wrong field shapes, an empty pool.
/// Surfaced once at startup and aborts the run.
#[derive(Debug, Error)]
pub enum InvalidInput {
  #[error("failed to read input bundle: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to parse input bundle: {0}")]
  Json(#[from] serde_json::Error),

  #[error("community record at index {0} has an empty pool")]
  EmptyPool(usize),

  #[error("community record at index {0} has no signing keys")]
  NoSigningKeys(usize),

  #[error("input bundle has no communities")]
  NoCommunities,
}

/// Why a candidate block was rejected by a verifier. Local to the verifying
/// node; the broadcaster reports it and drops the block. Never propagated as
/// a process-level failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidBlock {
  #[error("prev {0} is not on this chain")]
  UnknownPrev(Hash),

  #[error("transaction {0} failed validation: {1}")]
  Validation(Hash, ValidationFailure),
}

/// The specific validator policy point a transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationFailure {
  #[error("transaction number already seen on this chain")]
  NotFresh,
  #[error("recomputed hash does not match the claimed number")]
  HashMismatch,
  #[error("an input references a transaction not present on this chain")]
  UnknownInput,
  #[error("an input does not match any output of its referenced transaction")]
  IncorrectInput,
  #[error("inputs do not share a single signer, or the signature does not verify")]
  BadSignature,
  #[error("an input was already spent earlier on this chain")]
  DoubleSpend,
  #[error("sum of inputs does not equal sum of outputs")]
  NotConserved,
  #[error("empty inputs are only legal for boundary transactions")]
  EmptyInputsNotAllowed,
}

/// A split/merge boundary computation did not balance. This indicates a bug
/// in the accounting, not an adversarial input, so implementations abort the
/// operation rather than trying to recover.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConservationViolation {
  #[error("split evacuated {sent_to_gen} coins to the new community but its genesis sums to {genesis_sum}")]
  SplitMismatch { sent_to_gen: i128, genesis_sum: i128 },

  #[error("{0} spent inputs had no matching produced output within the boundary walk")]
  UnresolvedOutputs(usize),
}

/// Fewer approvals than the quorum required. Not an error condition in the
/// Rust sense — operations return this as a rejection, not a panic or an
/// `Err`, but it is named here so call sites can log consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumFailure {
  pub required: usize,
  pub received: usize,
}

impl std::fmt::Display for QuorumFailure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "needed {} approvals, got {}", self.required, self.received)
  }
}
