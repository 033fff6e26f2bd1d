//! The collection of all communities, the global mutation lock that
//! serializes topology changes, and the fee/quorum bookkeeping around
//! merge and split.
//!
//! Grounded on `mergesplit_network.py`'s `Network` class. Normal block
//! production (via [`crate::community::Community::try_produce_block`])
//! only ever takes a read lock on the roster to find its own community, so
//! it never contends with another community's worker; only `try_merge` and
//! `try_split` take the exclusive roster lock and the dedicated
//! `mutation_lock`.

use crate::community::{choose_seceding_group, generate_merge_transaction, generate_split_transactions, Community};
use crate::config::Config;
use crate::consensus::Chain;
use crate::error::QuorumFailure;
use crate::model::{Block, BlockKind, Output, Transaction};
use crate::primitives::{Hash, Pubkey};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub struct Network {
  pub config: Config,
  communities: RwLock<HashMap<u64, Mutex<Community>>>,
  mutation_lock: Mutex<()>,
  next_id: AtomicU64,
  pub num_merges: AtomicU64,
  pub num_splits: AtomicU64,
}

impl Network {
  pub fn new(config: Config, communities: Vec<Community>) -> Self {
    let next_id = communities.iter().map(|c| c.id).max().map_or(0, |m| m + 1);
    let map = communities.into_iter().map(|c| (c.id, Mutex::new(c))).collect();
    Self {
      config,
      communities: RwLock::new(map),
      mutation_lock: Mutex::new(()),
      next_id: AtomicU64::new(next_id),
      num_merges: AtomicU64::new(0),
      num_splits: AtomicU64::new(0),
    }
  }

  pub fn community_ids(&self) -> Vec<u64> {
    self.communities.read().unwrap().keys().copied().collect()
  }

  pub fn community_count(&self) -> usize {
    self.communities.read().unwrap().len()
  }

  /// Runs `f` against community `id` under only a read lock on the roster;
  /// never contends with another community's worker.
  pub fn with_community<R>(&self, id: u64, f: impl FnOnce(&mut Community) -> R) -> Option<R> {
    let roster = self.communities.read().unwrap();
    let cell = roster.get(&id)?;
    let mut community = cell.lock().unwrap();
    Some(f(&mut community))
  }

  fn fresh_id(&self) -> u64 {
    self.next_id.fetch_add(1, Ordering::SeqCst)
  }

  /// The scoring oracle gating a merge proposal. The spec requires only a
  /// deterministic boolean; this reference engine additionally rejects a
  /// community merging with itself, matching `mergesplit_network.py`'s
  /// `canMerge`.
  pub fn can_merge(&self, c1: u64, c2: u64) -> bool {
    c1 != c2
  }

  /// The scoring oracle gating a split proposal. Always true in this
  /// reference engine; a real deployment would consult a predictive model
  /// here, but that is out of scope (see `spec.md` §1).
  pub fn can_split(&self, _community: u64) -> bool {
    true
  }

  /// Issues a FEE block crediting `receiver` with `config.merge_split_fee`,
  /// signed by the receiver over the canonical payload. A no-op if the
  /// community or receiver no longer exists (the proposer may have been
  /// absorbed elsewhere by a concurrent operation).
  pub fn accrue_transaction_fee(&self, community_id: u64, receiver: Pubkey) {
    let applied = self.with_community(community_id, |community| {
      let idx = *community.node_index_by_pubkey.get(&receiver)?;
      let signer = community.nodes[idx].keypair.clone();
      let tx = Transaction::new_signed(vec![], vec![Output { value: self.config.merge_split_fee, pubkey: receiver }], &signer);
      let tip = community.nodes[idx].chain.longest_chain().hash;
      let block = Block::new(&tx, tip, BlockKind::Fee, None);
      Some(community.broadcast(block, BlockKind::Fee))
    });
    match applied.flatten() {
      Some(Ok(_)) => {}
      Some(Err(err)) => warn!(community_id, %err, "fee accrual rejected"),
      None => warn!(community_id, "fee accrual did not apply; receiver or community missing"),
    }
  }

  /// Attempts to merge `partner_id` into `initiator_id`, rejecting a
  /// self-merge and requiring at least `merge_quorum` approval from each
  /// community independently. On success, `initiator_id` absorbs every
  /// node and pool transaction from `partner_id`, which is removed from the
  /// roster; its worker thread observes this on its next roster lookup and
  /// exits.
  pub fn try_merge(&self, initiator_id: u64, partner_id: u64, proposer: Pubkey, rng: &mut impl Rng, force_approval: bool) -> bool {
    if !self.can_merge(initiator_id, partner_id) {
      return false;
    }

    let _mutation = self.mutation_lock.lock().unwrap();
    let mut roster = self.communities.write().unwrap();

    let (quorum_ok, merge_tx, initiator_tip, partner_tip) = {
      let initiator = match roster.get(&initiator_id) {
        Some(c) => c.lock().unwrap(),
        None => return false,
      };
      let partner = match roster.get(&partner_id) {
        Some(c) => c.lock().unwrap(),
        None => return false,
      };

      let required_a = (initiator.nodes.len() as f64 * self.config.merge_quorum).ceil() as usize;
      let required_b = (partner.nodes.len() as f64 * self.config.merge_quorum).ceil() as usize;
      let approvals_a = initiator.poll_approval(rng, &self.config, force_approval);
      let approvals_b = partner.poll_approval(rng, &self.config, force_approval);
      let ok = approvals_a >= required_a && approvals_b >= required_b;

      if approvals_a < required_a {
        let failure = QuorumFailure { required: required_a, received: approvals_a };
        debug!(initiator_id, %failure, "merge quorum not met on initiator side");
      }
      if approvals_b < required_b {
        let failure = QuorumFailure { required: required_b, received: approvals_b };
        debug!(partner_id, %failure, "merge quorum not met on partner side");
      }

      let merge_tx = generate_merge_transaction(&initiator, &partner);
      let initiator_tip = initiator.nodes[0].chain.longest_chain().hash;
      let partner_tip = partner.nodes[0].chain.longest_chain().hash;
      (ok, merge_tx, initiator_tip, partner_tip)
    };

    if !quorum_ok {
      return false; // QuorumFailure: silent rejection, no state change.
    }

    let partner_community = roster.remove(&partner_id).expect("checked above").into_inner().unwrap();
    let merge_block = Block::new(&merge_tx, initiator_tip, BlockKind::Merge, Some(partner_tip));

    let merged_chain = {
      let initiator = roster.get(&initiator_id).expect("checked above").lock().unwrap();
      let mut chain = initiator.nodes[0].chain.clone();
      chain.add_block(merge_block).expect("both tips were just read from these chains");
      chain
    };

    {
      let initiator_cell = roster.get(&initiator_id).expect("checked above");
      let mut initiator = initiator_cell.lock().unwrap();
      for node in &mut initiator.nodes {
        node.chain = merged_chain.clone();
      }
      for mut node in partner_community.nodes {
        node.chain = merged_chain.clone();
        initiator.node_index_by_pubkey.insert(node.pubkey, initiator.nodes.len());
        initiator.nodes.push(node);
      }
      initiator.pool.extend(partner_community.pool);
      initiator.update_stake(&merge_tx);
      initiator.redraw_waits(rng, &self.config);
    }

    drop(roster);
    self.num_merges.fetch_add(1, Ordering::SeqCst);
    info!(initiator_id, partner_id, "merge executed");
    self.accrue_transaction_fee(initiator_id, proposer);
    true
  }

  /// Attempts to split `community_id` in two, requiring at least
  /// `split_quorum` approval. Rejects communities smaller than 2 (cannot
  /// partition a single node). On success the community is replaced in the
  /// roster by two fresh ids and returned as `(old_id, new_id)`; the caller
  /// is responsible for retargeting its own worker at `old_id` and spawning
  /// a new one for `new_id`.
  pub fn try_split(&self, community_id: u64, proposer: Pubkey, rng: &mut impl Rng, force_approval: bool) -> Option<(u64, u64)> {
    if !self.can_split(community_id) {
      return None;
    }

    let _mutation = self.mutation_lock.lock().unwrap();
    let mut roster = self.communities.write().unwrap();

    let (split_tx, genesis_tx, seceding, old_tip) = {
      let cell = roster.get(&community_id)?;
      let community = cell.lock().unwrap();
      if community.nodes.len() < 2 {
        return None;
      }

      let required = (community.nodes.len() as f64 * self.config.split_quorum).ceil() as usize;
      let approvals = community.poll_approval(rng, &self.config, force_approval);
      if approvals < required {
        let failure = QuorumFailure { required, received: approvals };
        debug!(community_id, %failure, "split quorum not met");
        return None;
      }

      let seceding = choose_seceding_group(&community, rng);
      let (split_tx, genesis_tx) = match generate_split_transactions(&community, &seceding) {
        Ok(pair) => pair,
        Err(err) => {
          error!(community_id, %err, "split accounting failed to balance; aborting");
          return None;
        }
      };
      let old_tip = community.nodes[0].chain.longest_chain().hash;
      (split_tx, genesis_tx, seceding, old_tip)
    };

    let old_community = roster.remove(&community_id).expect("checked above").into_inner().unwrap();

    let split_block = Block::new(&split_tx, old_tip, BlockKind::Split, None);
    let mut old_chain = old_community.nodes[0].chain.clone();
    old_chain.add_block(split_block).expect("old_tip was just read from this chain");

    let mut new_chain = Chain::new();
    new_chain.set_genesis(Block::new(&genesis_tx, Hash::zero(), BlockKind::Genesis, None));

    let mut old_nodes = Vec::new();
    let mut new_nodes = Vec::new();
    for mut node in old_community.nodes {
      if seceding.contains(&node.pubkey) {
        node.chain = new_chain.clone();
        new_nodes.push(node);
      } else {
        node.chain = old_chain.clone();
        old_nodes.push(node);
      }
    }

    let old_id = self.fresh_id();
    let new_id = self.fresh_id();

    let mut old_community_final = Community::new(old_id, old_nodes, old_community.pool);
    old_community_final.update_stake(&split_tx);
    old_community_final.redraw_waits(rng, &self.config);

    let mut new_community_final = Community::new(new_id, new_nodes, Vec::new());
    new_community_final.update_stake(&genesis_tx);
    new_community_final.redraw_waits(rng, &self.config);

    let proposer_new_home = if seceding.contains(&proposer) { new_id } else { old_id };

    roster.insert(old_id, Mutex::new(old_community_final));
    roster.insert(new_id, Mutex::new(new_community_final));
    drop(roster);

    self.num_splits.fetch_add(1, Ordering::SeqCst);
    info!(old_id, new_id, "split executed");
    self.accrue_transaction_fee(proposer_new_home, proposer);
    Some((old_id, new_id))
  }
}
