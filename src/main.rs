#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use clap::Parser;

mod cli;
mod config;
mod constants;
mod ctx;
mod engine;
mod errors;
mod forge;
mod git;
mod journal;
mod plan;
mod reconcile;
mod store;
mod subcommands;
mod tree;

#[tokio::main]
async fn main() {
    if let Err(err) = cli::Cli::parse().run().await {
        eprintln!("Error: {err}");
        std::process::exit(err.exit_code());
    }
}
