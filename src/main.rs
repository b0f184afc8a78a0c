mod api;
mod cache;
mod cli;
mod config;
mod engine;
mod fees;
mod instructions;
mod monitoring;
mod route;
mod token;
mod transaction;

use anyhow::Result;
use clap::Parser;

use crate::cli::args::Cli;
use crate::cli::context::{init_tracing, load_configuration};

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.clone())?;
    init_tracing(&config.global.logging)?;
    cli::run(cli, config).await
}

#[cfg(any(
    feature = "hotpath-alloc-bytes-total",
    feature = "hotpath-alloc-count-total"
))]
#[tokio::main(flavor = "current_thread")]
#[cfg_attr(feature = "hotpath", hotpath::main(percentiles = [95, 99]))]
async fn main() -> Result<()> {
    run().await
}

#[cfg(not(any(
    feature = "hotpath-alloc-bytes-total",
    feature = "hotpath-alloc-count-total"
)))]
#[tokio::main]
#[cfg_attr(feature = "hotpath", hotpath::main(percentiles = [95, 99]))]
async fn main() -> Result<()> {
    run().await
}
