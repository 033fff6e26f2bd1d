//! The concrete scenarios from the specification's testable-properties
//! section: a quiescent single community, a rejected double-spend, a forced
//! split, a forced merge, post-topology-change quiescence, and canonical
//! hash stability.

use mergesplit::community::{Community, Node};
use mergesplit::config::Config;
use mergesplit::driver::Driver;
use mergesplit::io::{CommunityRecord, InputBundle};
use mergesplit::model::{Block, BlockKind, Input, Output, Transaction};
use mergesplit::network::Network;
use mergesplit::primitives::{Hash, Keypair};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn keypair(seed: u8) -> Keypair {
  Keypair::try_from(&[seed; 32][..]).unwrap()
}

/// A single-output genesis followed by a round-robin chain of whole-balance
/// transfers, one per remaining forger slot.
fn round_robin_pool(signers: &[Keypair], hops: usize) -> Vec<Transaction> {
  let total = 30;
  let genesis = Transaction::new_boundary(vec![], vec![Output { value: total, pubkey: signers[0].public() }]);
  let mut pool = vec![genesis];
  let mut holder = 0usize;
  for _ in 0..hops {
    let prev = pool.last().unwrap().clone();
    let next_holder = (holder + 1) % signers.len();
    let tx = Transaction::new_signed(
      vec![Input { ref_number: prev.number, output: Output { value: total, pubkey: signers[holder].public() } }],
      vec![Output { value: total, pubkey: signers[next_holder].public() }],
      &signers[holder],
    );
    pool.push(tx);
    holder = next_holder;
  }
  pool
}

#[test]
fn single_community_with_no_merges_reaches_the_expected_chain_length() {
  let signers: Vec<Keypair> = (0..3).map(keypair).collect();
  let pool = round_robin_pool(&signers, 9);
  let bundle = InputBundle { communities: vec![CommunityRecord { pool, signing_keys: signers }] };

  let driver = Driver::bootstrap(bundle, Config::default(), 1).unwrap();
  let summary = driver.run();

  assert_eq!(summary.communities, 1);
  assert_eq!(summary.num_merges, 0);
  assert_eq!(summary.num_splits, 0);
  assert_eq!(summary.chain_lengths, vec![(0, Some(10))]);
}

#[test]
fn a_double_spend_is_rejected_without_mutating_the_chain_or_stake() {
  let payer = keypair(1);
  let genesis_tx = Transaction::new_boundary(vec![], vec![Output { value: 10, pubkey: payer.public() }]);
  let genesis_block = Block::new(&genesis_tx, Hash::zero(), BlockKind::Genesis, None);
  let mut chain = mergesplit::consensus::Chain::new();
  chain.set_genesis(genesis_block);
  let mut node = Node::new(payer.clone(), chain);
  node.stake = 10;
  let mut community = Community::new(1, vec![node], vec![]);

  let first_spend = Transaction::new_signed(
    vec![Input { ref_number: genesis_tx.number, output: Output { value: 10, pubkey: payer.public() } }],
    vec![Output { value: 10, pubkey: keypair(2).public() }],
    &payer,
  );
  let tip = community.nodes[0].chain.longest_chain().hash;
  let block = Block::new(&first_spend, tip, BlockKind::Normal, None);
  assert!(community.broadcast(block, BlockKind::Normal).is_ok());
  assert_eq!(community.nodes[0].chain.longest_length(), 2);

  let double_spend = Transaction::new_signed(
    vec![Input { ref_number: genesis_tx.number, output: Output { value: 10, pubkey: payer.public() } }],
    vec![Output { value: 10, pubkey: keypair(3).public() }],
    &payer,
  );
  let tip = community.nodes[0].chain.longest_chain().hash;
  let stake_before = community.nodes[0].stake;
  let block = Block::new(&double_spend, tip, BlockKind::Normal, None);
  assert!(community.broadcast(block, BlockKind::Normal).is_err());
  assert_eq!(community.nodes[0].chain.longest_length(), 2);
  assert_eq!(community.nodes[0].stake, stake_before);
}

fn genesis_community(id: u64, node_count: usize, value_each: u64) -> Community {
  let signers: Vec<Keypair> = (0..node_count).map(|i| keypair((id * 10 + i as u64) as u8)).collect();
  let outputs: Vec<Output> = signers.iter().map(|k| Output { value: value_each, pubkey: k.public() }).collect();
  let genesis_tx = Transaction::new_boundary(vec![], outputs);
  let genesis_block = Block::new(&genesis_tx, Hash::zero(), BlockKind::Genesis, None);

  let nodes = signers
    .into_iter()
    .map(|keypair| {
      let mut chain = mergesplit::consensus::Chain::new();
      chain.set_genesis(genesis_block.clone());
      Node::new(keypair, chain)
    })
    .collect::<Vec<_>>();

  let mut community = Community::new(id, nodes, vec![]);
  community.update_stake(&genesis_tx);
  community
}

#[test]
fn a_forced_split_yields_two_disjoint_communities() {
  let community = genesis_community(1, 6, 10);
  let original_ids: Vec<_> = community.nodes.iter().map(|n| n.pubkey).collect();
  let network = Network::new(Config::default(), vec![community]);
  let mut rng = ChaCha20Rng::seed_from_u64(42);
  let proposer = original_ids[0];

  let (old_id, new_id) = network.try_split(1, proposer, &mut rng, true).unwrap();
  assert_eq!(network.community_count(), 2);

  let old_len = network.with_community(old_id, |c| c.nodes.len()).unwrap();
  let new_len = network.with_community(new_id, |c| c.nodes.len()).unwrap();
  assert_eq!(old_len, 3);
  assert_eq!(new_len, 3);

  let new_genesis_sum = network.with_community(new_id, |c| c.nodes[0].chain.longest_chain().block.transaction().unwrap().sum_outputs()).unwrap();
  assert!(new_genesis_sum > 0);

  // the two rosters are disjoint
  let old_members: Vec<_> = network.with_community(old_id, |c| c.nodes.iter().map(|n| n.pubkey).collect::<Vec<_>>()).unwrap();
  let new_members: Vec<_> = network.with_community(new_id, |c| c.nodes.iter().map(|n| n.pubkey).collect::<Vec<_>>()).unwrap();
  assert!(old_members.iter().all(|m| !new_members.contains(m)));
}

#[test]
fn a_forced_merge_absorbs_the_partner_and_credits_the_proposer() {
  let a = genesis_community(1, 3, 10);
  let b = genesis_community(2, 3, 10);
  let proposer = a.nodes[0].pubkey;
  let network = Network::new(Config::default(), vec![a, b]);
  let mut rng = ChaCha20Rng::seed_from_u64(7);

  let stake_before = network.with_community(1, |c| c.nodes[0].stake).unwrap();

  assert!(network.try_merge(1, 2, proposer, &mut rng, true));
  assert_eq!(network.community_count(), 1);

  let (has_prev2, restart_flags, stake_after) = network
    .with_community(1, |c| {
      let tip = c.nodes[0].chain.longest_chain();
      let has_prev2 = tip.block.prev2.is_some();
      let restart_flags = c.nodes.iter().all(|n| n.restart_flag);
      let stake_after = c.nodes.iter().find(|n| n.pubkey == proposer).unwrap().stake;
      (has_prev2, restart_flags, stake_after)
    })
    .unwrap();

  assert!(has_prev2, "merge block must record both parents");
  assert!(restart_flags, "every node gets a fresh restart_flag after a topology change");
  assert_eq!(stake_after, stake_before + Config::default().merge_split_fee as i64);
}

#[test]
fn canonical_block_hash_is_stable_across_independent_constructions() {
  let signer = keypair(4);
  let tx_a = Transaction::new_signed(
    vec![Input { ref_number: Hash::digest("x"), output: Output { value: 3, pubkey: signer.public() } }],
    vec![Output { value: 3, pubkey: keypair(5).public() }],
    &signer,
  );
  // A second, independently-built transaction with the identical fields
  // (standing in for "two independent implementations" of the same value).
  let tx_b = Transaction::new_signed(
    vec![Input { ref_number: Hash::digest("x"), output: Output { value: 3, pubkey: signer.public() } }],
    vec![Output { value: 3, pubkey: keypair(5).public() }],
    &signer,
  );
  assert_eq!(tx_a.number, tx_b.number);

  let prev = Hash::digest("shared-prev");
  let block_a = Block::new(&tx_a, prev, BlockKind::Normal, None);
  let block_b = Block::new(&tx_b, prev, BlockKind::Normal, None);
  assert_eq!(block_a.hash(), block_b.hash());
}
