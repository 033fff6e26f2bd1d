//! Tunables. Kept as a single struct with a `Default` impl rather than
//! compile-time constants so a seeded test scenario can override the
//! approval odds or quorum without recompiling (the spec calls these
//! "compile-time constants acceptable", not required).

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
  /// Coins credited to a proposer for a successfully executed merge or split.
  pub merge_split_fee: u64,
  /// Upper bound, in seconds, of a node's random proposal wait.
  pub request_timeout_secs: u64,
  /// Consulted by the (currently stubbed) scoring oracle; not otherwise used
  /// by the reference engine.
  pub prediction_threshold: f64,
  /// Fraction of a community's forgers that must approve a split.
  pub split_quorum: f64,
  /// Fraction of a community's forgers that must approve a merge.
  pub merge_quorum: f64,
  /// Probability that a sampled creator emits a topology proposal instead of
  /// a normal block.
  pub proposal_probability: f64,
  /// Probability that an individual forger approves a pending merge/split
  /// proposal, absent a forced override. Matches the reference
  /// implementation's `random.randint(0, 4) != 0`.
  pub approval_chance: f64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      merge_split_fee: 5,
      request_timeout_secs: 60,
      prediction_threshold: 0.6,
      split_quorum: 0.5,
      merge_quorum: 2.0 / 3.0,
      proposal_probability: 1.0 / 3.0,
      approval_chance: 0.8,
    }
  }
}
