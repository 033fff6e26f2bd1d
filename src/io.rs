//! The external JSON interfaces: the input bundle format and the per-node
//! chain dump written at the end of a run.
//!
//! Grounded on `utils.py`'s `validateLegalTransaction`/`parseTransactions`
//! (structural validation, silently dropping malformed records) and
//! `driver.py`'s `<root>/community{id}/blockchains_node{i+1}.json` output
//! layout.

use crate::model::{Input, Output, Transaction};
use crate::primitives::{Hash, Keypair, Pubkey};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::warn;

/// One community record from the input file: its transaction pool (first
/// entry is the genesis transaction) and its forgers' signing keys.
pub struct CommunityRecord {
  pub pool: Vec<Transaction>,
  pub signing_keys: Vec<Keypair>,
}

pub struct InputBundle {
  pub communities: Vec<CommunityRecord>,
}

/// Parses the input file, silently dropping any transaction record that
/// fails structural validation (wrong key set, wrong arity) rather than
/// aborting the whole run — matching `utils.py`'s `parseTransactions`.
pub fn parse_input_bundle(path: &Path) -> Result<InputBundle, crate::error::InvalidInput> {
  let raw = fs::read_to_string(path)?;
  let records: Vec<RawCommunity> = serde_json::from_str(&raw)?;

  let communities = records
    .into_iter()
    .enumerate()
    .map(|(index, raw)| {
      let pool = raw.pool.into_iter().filter_map(|v| parse_legal_transaction(&v)).collect();
      let signing_keys = raw
        .signing_keys
        .into_iter()
        .filter_map(|(pubkey_hex, privkey_hex)| match privkey_hex.parse::<Keypair>() {
          Ok(kp) if kp.public().to_string() == pubkey_hex => Some(kp),
          Ok(_) => {
            warn!(index, "signing key pair's public half does not match its private half; dropped");
            None
          }
          Err(err) => {
            warn!(index, %err, "unparsable signing key; dropped");
            None
          }
        })
        .collect();
      CommunityRecord { pool, signing_keys }
    })
    .collect();

  Ok(InputBundle { communities })
}

#[derive(Deserialize)]
struct RawCommunity {
  pool: Vec<Value>,
  #[serde(rename = "signingKeys")]
  signing_keys: Vec<(String, String)>,
}

/// Validates a transaction record's structural shape — exactly the four
/// keys `number`/`input`/`output`/`sig`, and exactly two keys in every
/// input/output record — and parses it. Returns `None` (dropping the
/// record) on any shape mismatch rather than erroring.
fn parse_legal_transaction(v: &Value) -> Option<Transaction> {
  let obj = v.as_object()?;
  if obj.len() != 4 {
    return None;
  }
  let number: Hash = obj.get("number")?.as_str()?.parse().ok()?;
  let sig = obj.get("sig")?.as_str()?.to_owned();
  let inputs = obj.get("input")?.as_array()?.iter().map(parse_legal_input).collect::<Option<Vec<_>>>()?;
  let outputs = obj.get("output")?.as_array()?.iter().map(parse_legal_output).collect::<Option<Vec<_>>>()?;

  let tx = Transaction { number, inputs, outputs, signature: sig };
  if tx.recompute_number() != tx.number {
    return None;
  }
  Some(tx)
}

fn parse_legal_input(v: &Value) -> Option<Input> {
  let obj = v.as_object()?;
  if obj.len() != 2 {
    return None;
  }
  let ref_number: Hash = obj.get("number")?.as_str()?.parse().ok()?;
  let output = parse_legal_output(obj.get("output")?)?;
  Some(Input { ref_number, output })
}

fn parse_legal_output(v: &Value) -> Option<Output> {
  let obj = v.as_object()?;
  if obj.len() != 2 {
    return None;
  }
  let value = obj.get("value")?.as_u64()?;
  let pubkey: Pubkey = obj.get("pubkey")?.as_str()?.parse().ok()?;
  Some(Output { value, pubkey })
}

/// Writes a node's longest chain, tip to genesis, as an ordered JSON list
/// of `{tx, prev}` records to
/// `<root>/community{community_id}/blockchains_node{i}.json`.
pub fn write_node_chain(root: &Path, community_id: u64, node_index: usize, log: &[crate::consensus::LogRecord]) -> anyhow::Result<()> {
  let dir = root.join(format!("community{community_id}"));
  fs::create_dir_all(&dir)?;
  let path = dir.join(format!("blockchains_node{}.json", node_index + 1));
  let json = serde_json::to_string_pretty(log)?;
  fs::write(path, json)?;
  Ok(())
}
