//! Command-line surface: `<program> <input_file> <output_root>`.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct CliOpts {
  /// Path to the input bundle (an ordered list of community records).
  pub input: PathBuf,

  /// Directory under which per-node chain dumps are written.
  pub output_root: PathBuf,

  #[clap(short, long, parse(from_occurrences), help = "Use verbose output (-vv very verbose output)")]
  pub verbose: u64,

  #[clap(long, help = "seed the simulation's RNG for a reproducible run")]
  pub seed: Option<u64>,
}
