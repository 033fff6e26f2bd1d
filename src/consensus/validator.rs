//! Pure validation of a transaction against a chain prefix.
//!
//! Every check here is a function of `(chain, prev, tx, kind)` only — no
//! hidden state, no mutation. This is what lets both a community's own
//! proposer and every other member independently reach the same verdict
//! during `broadcast`.

use crate::consensus::chain::Chain;
use crate::error::ValidationFailure;
use crate::model::{BlockKind, Transaction};
use crate::primitives::{parse_signature, verify, Hash, Pubkey};
use std::collections::HashSet;

/// Runs the seven-point policy from the specification against the chain
/// prefix ending at `prev`. `kind` selects which checks are skipped: FEE,
/// SPLIT and MERGE boundary transactions never go through the
/// single-signer/signature or conservation checks.
pub fn validate(chain: &Chain, prev: Hash, tx: &Transaction, kind: BlockKind) -> Result<(), ValidationFailure> {
  if tx.inputs.is_empty() && !kind.allows_empty_inputs() {
    return Err(ValidationFailure::EmptyInputsNotAllowed);
  }

  // 2. Hash integrity.
  if tx.recompute_number() != tx.number {
    return Err(ValidationFailure::HashMismatch);
  }

  let history: Vec<Transaction> = chain
    .walk_from(prev)
    .into_iter()
    .map(|node| node.block.transaction().expect("chain only stores well-formed blocks"))
    .collect();

  // 1. Freshness.
  if history.iter().any(|past| past.number == tx.number) {
    return Err(ValidationFailure::NotFresh);
  }

  // 3 & 4. Input existence and correctness.
  for input in &tx.inputs {
    let referenced = history
      .iter()
      .find(|past| past.number == input.ref_number)
      .ok_or(ValidationFailure::UnknownInput)?;
    if !referenced.outputs.contains(&input.output) {
      return Err(ValidationFailure::IncorrectInput);
    }
  }

  // 6. No double-spend: every input ever consumed along the walk.
  let spent: HashSet<(Hash, u64, Pubkey)> = history
    .iter()
    .flat_map(|past| past.inputs.iter())
    .map(|input| (input.ref_number, input.output.value, input.output.pubkey))
    .collect();
  for input in &tx.inputs {
    let key = (input.ref_number, input.output.value, input.output.pubkey);
    if spent.contains(&key) {
      return Err(ValidationFailure::DoubleSpend);
    }
  }

  if !kind.skips_signature_and_conservation() {
    // 5. Single signer and signature.
    let signer = tx.sole_signer().ok_or(ValidationFailure::BadSignature)?;
    let signature = parse_signature(&tx.signature).ok_or(ValidationFailure::BadSignature)?;
    let payload = Transaction::signing_payload(&tx.inputs, &tx.outputs);
    if !verify(&signer, &payload, &signature) {
      return Err(ValidationFailure::BadSignature);
    }

    // 7. Conservation.
    if tx.sum_inputs() != tx.sum_outputs() {
      return Err(ValidationFailure::NotConserved);
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Block, Input, Output};
  use crate::primitives::Keypair;

  fn keypair(seed: u8) -> Keypair {
    Keypair::try_from(&[seed; 32][..]).unwrap()
  }

  fn genesis_chain(outputs: Vec<Output>) -> (Chain, Hash) {
    let mut chain = Chain::new();
    let tx = Transaction::new_boundary(vec![], outputs);
    let block = Block::new(&tx, Hash::zero(), BlockKind::Genesis, None);
    let hash = chain.set_genesis(block);
    (chain, hash)
  }

  #[test]
  fn accepts_a_conserving_single_signer_transaction() {
    let payer = keypair(1);
    let (chain, genesis_hash) = genesis_chain(vec![Output { value: 10, pubkey: payer.public() }]);
    let genesis_tx = chain.longest_chain().block.transaction().unwrap();

    let tx = Transaction::new_signed(
      vec![Input { ref_number: genesis_tx.number, output: Output { value: 10, pubkey: payer.public() } }],
      vec![Output { value: 10, pubkey: keypair(2).public() }],
      &payer,
    );

    assert!(validate(&chain, genesis_hash, &tx, BlockKind::Normal).is_ok());
  }

  #[test]
  fn rejects_conservation_violation() {
    let payer = keypair(1);
    let (chain, genesis_hash) = genesis_chain(vec![Output { value: 10, pubkey: payer.public() }]);
    let genesis_tx = chain.longest_chain().block.transaction().unwrap();

    let tx = Transaction::new_signed(
      vec![Input { ref_number: genesis_tx.number, output: Output { value: 10, pubkey: payer.public() } }],
      vec![Output { value: 999, pubkey: keypair(2).public() }],
      &payer,
    );

    assert_eq!(validate(&chain, genesis_hash, &tx, BlockKind::Normal), Err(ValidationFailure::NotConserved));
  }

  #[test]
  fn rejects_double_spend_of_the_same_input() {
    let payer = keypair(1);
    let (mut chain, genesis_hash) = genesis_chain(vec![Output { value: 10, pubkey: payer.public() }]);
    let genesis_tx = chain.longest_chain().block.transaction().unwrap();

    let spend = Transaction::new_signed(
      vec![Input { ref_number: genesis_tx.number, output: Output { value: 10, pubkey: payer.public() } }],
      vec![Output { value: 10, pubkey: keypair(2).public() }],
      &payer,
    );
    let tip = chain.add_block(Block::new(&spend, genesis_hash, BlockKind::Normal, None)).unwrap();

    let double_spend = Transaction::new_signed(
      vec![Input { ref_number: genesis_tx.number, output: Output { value: 10, pubkey: payer.public() } }],
      vec![Output { value: 10, pubkey: keypair(3).public() }],
      &payer,
    );

    assert_eq!(validate(&chain, tip, &double_spend, BlockKind::Normal), Err(ValidationFailure::DoubleSpend));
  }

  #[test]
  fn boundary_transactions_skip_conservation() {
    let (chain, genesis_hash) = genesis_chain(vec![]);
    let fee_tx = Transaction::new_boundary(vec![], vec![Output { value: 5, pubkey: keypair(9).public() }]);
    assert!(validate(&chain, genesis_hash, &fee_tx, BlockKind::Fee).is_ok());
  }

  #[test]
  fn rejects_hash_tampering() {
    let (chain, genesis_hash) = genesis_chain(vec![]);
    let mut tx = Transaction::new_boundary(vec![], vec![Output { value: 5, pubkey: keypair(9).public() }]);
    tx.number = Hash::digest("tampered");
    assert_eq!(validate(&chain, genesis_hash, &tx, BlockKind::Fee), Err(ValidationFailure::HashMismatch));
  }
}
