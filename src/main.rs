//! LatentBridge CLI: thin dispatch over the library.

use clap::Parser;
use colored::Colorize;

use latentbridge::cli::{Command, LatentCli};
use latentbridge::commands;
use latentbridge::config::load_or_default;
use latentbridge::core::debug::init_tracing;

fn main() {
    let args = LatentCli::parse();
    init_tracing(args.debug);
    if let Err(e) = dispatch(args) {
        eprintln!("{} {:#}", "err:".red().bold(), e);
        std::process::exit(1);
    }
}

fn dispatch(args: LatentCli) -> anyhow::Result<()> {
    let cfg = load_or_default(&args.config)?;
    match args.cmd {
        Command::Svd { input, truncate, out } => commands::decompose::svd(&cfg, input, truncate, out),
        Command::Procrustes { input, alpha, out } => commands::decompose::procrustes(&cfg, input, alpha, out),
        Command::Ridge { w_in, w_out, lambda, out } => commands::align::ridge(&cfg, w_in, w_out, lambda, out),
        Command::Train { source, target, epochs, seed, out } => {
            commands::align::train(&cfg, source, target, epochs, seed, out)
        }
        Command::Anchor { source, target, no_correction, rank, out } => {
            commands::align::anchor(&cfg, source, target, no_correction, rank, out)
        }
        Command::Rollout { alignment, h0, steps, threshold, no_protection, cache_out, out } => {
            commands::rollout::run(&cfg, alignment, h0, steps, threshold, no_protection, cache_out, out)
        }
        Command::Compress { cache, threshold, estimate, out } => {
            commands::compress::run(&cfg, cache, threshold, estimate, out)
        }
        Command::Synth { source_dim, target_dim, points, noise, seed, out_dir } => {
            commands::synth::run(source_dim, target_dim, points, noise, seed, out_dir)
        }
        Command::Config => {
            print!("{}", cfg.to_toml_string()?);
            Ok(())
        }
    }
}
