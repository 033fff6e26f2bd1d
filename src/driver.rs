//! The scheduler: spawns one worker thread per community, drives proposer
//! rounds, and reports a post-run summary.
//!
//! Grounded on `driver.py`'s `Driver` class: `initializeSimulation` becomes
//! [`Driver::bootstrap`], `simulate`/`main`'s thread choreography becomes
//! [`Driver::run`], and the stdout report at the end of `main()` becomes
//! [`Summary`].

use crate::community::{Community, Node};
use crate::config::Config;
use crate::consensus::Chain;
use crate::error::InvalidInput;
use crate::io::{CommunityRecord, InputBundle};
use crate::model::{Block, BlockKind};
use crate::network::Network;
use crate::primitives::Hash;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::time::{Duration, Instant};
use tracing::debug;

/// The post-run report described in `spec.md` §6's CLI stdout contract.
#[derive(Debug)]
pub struct Summary {
  pub communities: usize,
  pub threads_started: usize,
  /// One entry per community that existed at shutdown: its longest chain
  /// length, or `None` if its forgers disagree (a quiescence bug).
  pub chain_lengths: Vec<(u64, Option<usize>)>,
  pub elapsed: Duration,
  pub num_merges: u64,
  pub num_splits: u64,
}

pub struct Driver {
  network: Network,
  seed: u64,
}

impl Driver {
  /// Parses the input bundle into initial communities. The first pool
  /// transaction in each community record is installed directly as the
  /// GENESIS transaction for every forger's chain (bypassing the
  /// validator, which never runs against a GENESIS block); the rest seed
  /// the community's pool.
  pub fn bootstrap(bundle: InputBundle, config: Config, seed: u64) -> Result<Self, InvalidInput> {
    if bundle.communities.is_empty() {
      return Err(InvalidInput::NoCommunities);
    }

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut communities = Vec::with_capacity(bundle.communities.len());

    for (index, record) in bundle.communities.into_iter().enumerate() {
      communities.push(bootstrap_community(index as u64, record, &mut rng)?);
    }

    Ok(Self { network: Network::new(config, communities), seed })
  }

  pub fn network(&self) -> &Network {
    &self.network
  }

  /// Spawns one worker per community and blocks until every worker has
  /// quiesced (no pool transaction validates against its community any
  /// longer). Splits spawn an additional worker for the seceded community;
  /// merges silently retire the absorbed community's worker.
  pub fn run(&self) -> Summary {
    let start = Instant::now();
    let initial_ids = self.network.community_ids();
    let threads_started = std::sync::atomic::AtomicUsize::new(initial_ids.len());

    std::thread::scope(|scope| {
      for id in &initial_ids {
        let rng = ChaCha20Rng::seed_from_u64(self.seed ^ id.wrapping_mul(0x9E3779B97F4A7C15));
        let network = &self.network;
        let threads_started = &threads_started;
        scope.spawn(move || run_worker(scope, network, *id, rng, threads_started));
      }
    });

    let elapsed = start.elapsed();
    let remaining_ids = self.network.community_ids();
    let chain_lengths = remaining_ids
      .iter()
      .map(|&id| (id, self.network.with_community(id, community_chain_length).flatten()))
      .collect();

    Summary {
      communities: remaining_ids.len(),
      threads_started: threads_started.load(std::sync::atomic::Ordering::SeqCst),
      chain_lengths,
      elapsed,
      num_merges: self.network.num_merges.load(std::sync::atomic::Ordering::SeqCst),
      num_splits: self.network.num_splits.load(std::sync::atomic::Ordering::SeqCst),
    }
  }
}

/// `Some(length)` if every forger's longest chain is block-for-block equal
/// (the ledger verifier's `check_matched_sequences`), else `None`.
fn community_chain_length(community: &mut Community) -> Option<usize> {
  let reference = community.nodes[0].chain.log();
  for node in &community.nodes {
    if node.chain.log() != reference {
      tracing::warn!(community = community.id, "forgers disagree on the longest chain after quiescence");
      return None;
    }
  }
  Some(community.nodes[0].chain.longest_length())
}

fn bootstrap_community(id: u64, record: CommunityRecord, rng: &mut ChaCha20Rng) -> Result<Community, InvalidInput> {
  if record.pool.is_empty() {
    return Err(InvalidInput::EmptyPool(id as usize));
  }
  if record.signing_keys.is_empty() {
    return Err(InvalidInput::NoSigningKeys(id as usize));
  }

  let mut pool = record.pool;
  let genesis_tx = pool.remove(0);
  let genesis_block = Block::new(&genesis_tx, Hash::random(rng), BlockKind::Genesis, None);

  let nodes = record
    .signing_keys
    .into_iter()
    .map(|keypair| {
      let mut chain = Chain::new();
      chain.set_genesis(genesis_block.clone());
      Node::new(keypair, chain)
    })
    .collect::<Vec<_>>();

  let mut community = Community::new(id, nodes, pool);
  community.update_stake(&genesis_tx);
  Ok(community)
}

/// One community's worker body. Runs until no pool transaction validates,
/// occasionally proposing a merge or split instead of a normal block.
fn run_worker<'scope>(
  scope: &'scope std::thread::Scope<'scope, '_>,
  network: &'scope Network,
  mut id: u64,
  mut rng: ChaCha20Rng,
  threads_started: &'scope std::sync::atomic::AtomicUsize,
) {
  loop {
    let should_continue = network.with_community(id, |community| {
      for node in &mut community.nodes {
        node.restart_flag = false;
      }
      community.valid_transaction_exists()
    });

    let Some(should_continue) = should_continue else {
      // Our community was absorbed by a merge initiated elsewhere.
      return;
    };
    if !should_continue {
      return;
    }

    let creator_pubkey = network.with_community(id, |community| {
      let idx = community.select_creator(&mut rng);
      community.nodes[idx].pubkey
    });
    let Some(creator_pubkey) = creator_pubkey else { return };

    if rng.gen_bool(network.config.proposal_probability) {
      let partner_id = pick_partner(network, id, &mut rng);
      if rng.gen_bool(0.5) {
        if let Some(partner_id) = partner_id {
          debug!(id, partner_id, "proposing merge");
          network.try_merge(id, partner_id, creator_pubkey, &mut rng, false);
        }
      } else {
        debug!(id, "proposing split");
        if let Some((old_id, new_id)) = network.try_split(id, creator_pubkey, &mut rng, false) {
          id = old_id;
          threads_started.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
          let child_seed = rng.gen::<u64>();
          let child_rng = ChaCha20Rng::seed_from_u64(child_seed);
          scope.spawn(move || run_worker(scope, network, new_id, child_rng, threads_started));
        }
      }
    } else {
      network.with_community(id, |community| {
        let idx = community.node_index_by_pubkey[&creator_pubkey];
        community.try_produce_block(idx);
      });
    }
  }
}

fn pick_partner(network: &Network, id: u64, rng: &mut impl Rng) -> Option<u64> {
  let mut candidates: Vec<u64> = network.community_ids().into_iter().filter(|&c| c != id).collect();
  if candidates.is_empty() {
    return None;
  }
  let index = rng.gen_range(0..candidates.len());
  Some(candidates.swap_remove(index))
}
