mod cli;
mod community;
mod config;
mod consensus;
mod driver;
mod error;
mod io;
mod model;
mod network;
mod primitives;

use {
  clap::Parser,
  cli::CliOpts,
  config::Config,
  driver::{Driver, Summary},
  tracing::{info, Level},
  tracing_subscriber::{filter::filter_fn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, Layer},
};

fn print_essentials(opts: &CliOpts) {
  info!("Starting MergeSplit simulation");
  info!("Version: {}", env!("CARGO_PKG_VERSION"));
  info!("Input bundle: {}", opts.input.display());
  info!("Output root: {}", opts.output_root.display());
  if let Some(seed) = opts.seed {
    info!("Seed: {seed} (fixed)");
  } else {
    info!("Seed: none given, deriving one from the process clock");
  }
}

fn report(summary: &Summary) {
  println!("communities at quiescence: {}", summary.communities);
  println!("worker threads started:    {}", summary.threads_started);
  println!("merges executed:           {}", summary.num_merges);
  println!("splits executed:           {}", summary.num_splits);
  println!("elapsed:                   {:.3}s", summary.elapsed.as_secs_f64());
  for (id, length) in &summary.chain_lengths {
    match length {
      Some(len) => println!("  community {id}: longest chain length {len}"),
      None => println!("  community {id}: forgers disagree on the longest chain (!)"),
    }
  }
}

fn main() -> anyhow::Result<()> {
  let opts = CliOpts::parse();

  let loglevel = match opts.verbose {
    1 => Level::DEBUG,
    2.. => Level::TRACE,
    _ => Level::INFO,
  };
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer().with_filter(filter_fn(move |metadata| metadata.level() <= &loglevel)))
    .init();

  print_essentials(&opts);

  let bundle = io::parse_input_bundle(&opts.input)?;
  let seed = opts.seed.unwrap_or_else(|| {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
  });

  let driver = Driver::bootstrap(bundle, Config::default(), seed)?;
  let summary = driver.run();

  for &id in &driver.network().community_ids() {
    driver.network().with_community(id, |community| {
      for (index, node) in community.nodes.iter().enumerate() {
        let log = node.chain.log();
        if let Err(err) = io::write_node_chain(&opts.output_root, id, index, &log) {
          tracing::warn!(community = id, node = index, %err, "failed to write chain dump");
        }
      }
    });
  }

  report(&summary);
  Ok(())
}
