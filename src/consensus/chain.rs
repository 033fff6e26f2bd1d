//! Per-community append-only chain with fork tracking and longest-chain
//! selection.
//!
//! Unlike this crate's ancestor (a GHOST/vote-weighted fork-choice with
//! two-epoch CBC Casper finalization), a MergeSplit chain has no notion of
//! stake-weighted voting or finality: the canonical head is simply whichever
//! tip is deepest, ties broken by whichever fork reached that depth first.

use crate::error::InvalidBlock;
use crate::model::Block;
use crate::primitives::Hash;
use serde::Serialize;
use std::collections::HashMap;

/// A single block attached to a chain, plus the bookkeeping the chain needs
/// to walk it: its own hash and a non-owning link to its parent.
#[derive(Debug, Clone)]
pub struct ChainNode {
  pub block: Block,
  pub hash: Hash,
  pub parent: Option<Hash>,
  /// Distance from genesis; genesis itself has depth 1.
  pub depth: usize,
}

/// An ordered `{tx, prev}` record as emitted by [`Chain::log`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
  pub tx: Hash,
  pub prev: Hash,
}

/// A community's append-only block DAG.
#[derive(Debug, Clone)]
pub struct Chain {
  by_hash: HashMap<Hash, ChainNode>,
  tips: Vec<Hash>,
  tip_index_by_hash: HashMap<Hash, usize>,
  child_count: HashMap<Hash, usize>,
  longest_tip_index: Option<usize>,
  longest_length: usize,
}

impl Chain {
  pub fn new() -> Self {
    Self {
      by_hash: HashMap::new(),
      tips: Vec::new(),
      tip_index_by_hash: HashMap::new(),
      child_count: HashMap::new(),
      longest_tip_index: None,
      longest_length: 0,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.by_hash.is_empty()
  }

  pub fn len(&self) -> usize {
    self.by_hash.len()
  }

  /// Installs `block` as the sole tip. Requires `block.kind == Genesis` and
  /// an empty chain.
  pub fn set_genesis(&mut self, block: Block) -> Hash {
    assert!(self.is_empty(), "set_genesis called on a non-empty chain");
    assert_eq!(block.kind, crate::model::BlockKind::Genesis);
    let hash = block.hash();
    let node = ChainNode { block, hash, parent: None, depth: 1 };
    self.by_hash.insert(hash, node);
    self.tips.push(hash);
    self.tip_index_by_hash.insert(hash, 0);
    self.longest_tip_index = Some(0);
    self.longest_length = 1;
    hash
  }

  /// Appends `block`, whose `prev` must already be on this chain.
  /// Idempotent: re-inserting a block with a hash already present is a
  /// no-op that returns the existing hash.
  pub fn add_block(&mut self, block: Block) -> Result<Hash, InvalidBlock> {
    let prev = block.prev;
    if !self.by_hash.contains_key(&prev) {
      return Err(InvalidBlock::UnknownPrev(prev));
    }

    let hash = block.hash();
    if self.by_hash.contains_key(&hash) {
      return Ok(hash);
    }

    let parent_depth = self.by_hash[&prev].depth;
    let depth = parent_depth + 1;
    let existing_children = *self.child_count.get(&prev).unwrap_or(&0);

    if existing_children == 0 {
      // `prev` was a tip; this block replaces it in its fork slot.
      if let Some(&idx) = self.tip_index_by_hash.get(&prev) {
        self.tips[idx] = hash;
        self.tip_index_by_hash.remove(&prev);
        self.tip_index_by_hash.insert(hash, idx);
      } else {
        // `prev` has no children yet but also isn't a live tip: this can
        // only happen if it was already superseded, which contradicts
        // `existing_children == 0`. Treat it defensively as a new tip.
        self.tip_index_by_hash.insert(hash, self.tips.len());
        self.tips.push(hash);
      }
    } else {
      // `prev` already has at least one child: this is a new fork.
      self.tip_index_by_hash.insert(hash, self.tips.len());
      self.tips.push(hash);
    }

    self.child_count.insert(prev, existing_children + 1);
    self.by_hash.insert(hash, ChainNode { block, hash, parent: Some(prev), depth });

    if depth > self.longest_length {
      self.longest_length = depth;
      self.longest_tip_index = self.tip_index_by_hash.get(&hash).copied();
    }

    Ok(hash)
  }

  pub fn is_valid_prev(&self, hash: Hash) -> bool {
    self.by_hash.contains_key(&hash)
  }

  pub fn get(&self, hash: Hash) -> Option<&ChainNode> {
    self.by_hash.get(&hash)
  }

  /// The tip of the deepest fork. Ties are broken by whichever fork reached
  /// that depth first, since `longest_tip_index` is only ever overwritten by
  /// a strictly deeper block.
  pub fn longest_chain(&self) -> &ChainNode {
    let idx = self.longest_tip_index.expect("chain has no genesis yet");
    &self.by_hash[&self.tips[idx]]
  }

  pub fn longest_length(&self) -> usize {
    self.longest_length
  }

  pub fn tips(&self) -> impl Iterator<Item = &ChainNode> {
    self.tips.iter().map(move |h| &self.by_hash[h])
  }

  /// Walks from `from` back to genesis, nearest-first.
  pub fn walk_from(&self, from: Hash) -> Vec<&ChainNode> {
    let mut out = Vec::new();
    let mut cursor = Some(from);
    while let Some(h) = cursor {
      let node = match self.by_hash.get(&h) {
        Some(n) => n,
        None => break,
      };
      out.push(node);
      cursor = node.parent;
    }
    out
  }

  /// Walks the longest chain back to genesis and emits one `{tx, prev}`
  /// record per block, nearest-tip-first.
  pub fn log(&self) -> Vec<LogRecord> {
    self
      .walk_from(self.longest_chain().hash)
      .into_iter()
      .map(|node| LogRecord { tx: Hash::digest(&node.block.tx), prev: node.block.prev })
      .collect()
  }
}

impl Default for Chain {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BlockKind, Transaction};

  fn block(tx: &Transaction, prev: Hash, kind: BlockKind) -> Block {
    Block::new(tx, prev, kind, None)
  }

  #[test]
  fn set_genesis_then_extend_grows_longest_length() {
    let mut chain = Chain::new();
    let genesis_tx = Transaction::new_boundary(vec![], vec![]);
    let genesis_hash = chain.set_genesis(block(&genesis_tx, Hash::zero(), BlockKind::Genesis));
    assert_eq!(chain.longest_length(), 1);

    let tx1 = Transaction::new_boundary(vec![], vec![]);
    let b1 = block(&tx1, genesis_hash, BlockKind::Fee);
    let h1 = chain.add_block(b1).unwrap();
    assert_eq!(chain.longest_length(), 2);
    assert_eq!(chain.longest_chain().hash, h1);
  }

  #[test]
  fn forking_creates_a_new_tip_without_disturbing_the_longer_one() {
    let mut chain = Chain::new();
    let genesis_tx = Transaction::new_boundary(vec![], vec![]);
    let genesis_hash = chain.set_genesis(block(&genesis_tx, Hash::zero(), BlockKind::Genesis));

    let tx_a = Transaction::new_boundary(vec![], vec![]);
    let a = chain.add_block(block(&tx_a, genesis_hash, BlockKind::Fee)).unwrap();

    let tx_b = Transaction::new_boundary(vec![], vec![]);
    let tx_b = Transaction { number: Hash::digest("fork-b"), ..tx_b };
    let b = chain.add_block(block(&tx_b, genesis_hash, BlockKind::Fee)).unwrap();

    assert_eq!(chain.tips().count(), 2);
    // First-reached-wins: `a` was inserted first, so it remains the
    // longest tip even though `b` has equal depth.
    assert_eq!(chain.longest_chain().hash, a);
    assert_ne!(a, b);
  }

  #[test]
  fn add_block_rejects_unknown_prev() {
    let mut chain = Chain::new();
    let tx = Transaction::new_boundary(vec![], vec![]);
    let err = chain.add_block(block(&tx, Hash::digest("nowhere"), BlockKind::Fee)).unwrap_err();
    assert!(matches!(err, InvalidBlock::UnknownPrev(_)));
  }

  #[test]
  fn duplicate_insertion_is_idempotent() {
    let mut chain = Chain::new();
    let genesis_tx = Transaction::new_boundary(vec![], vec![]);
    let genesis_hash = chain.set_genesis(block(&genesis_tx, Hash::zero(), BlockKind::Genesis));
    let tx = Transaction::new_boundary(vec![], vec![]);
    let b = block(&tx, genesis_hash, BlockKind::Fee);
    let first = chain.add_block(b.clone()).unwrap();
    let second = chain.add_block(b).unwrap();
    assert_eq!(first, second);
    assert_eq!(chain.longest_length(), 2);
  }

  #[test]
  fn log_walks_longest_chain_to_genesis() {
    let mut chain = Chain::new();
    let genesis_tx = Transaction::new_boundary(vec![], vec![]);
    let genesis_hash = chain.set_genesis(block(&genesis_tx, Hash::zero(), BlockKind::Genesis));
    let tx = Transaction::new_boundary(vec![], vec![]);
    chain.add_block(block(&tx, genesis_hash, BlockKind::Fee)).unwrap();
    let log = chain.log();
    assert_eq!(log.len(), 2);
    assert_eq!(log.last().unwrap().prev, Hash::zero());
  }
}
