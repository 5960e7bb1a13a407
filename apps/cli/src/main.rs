//! manifestgen CLI: render install manifests from a release or a local overlay.
//!
//! Produces a single multi-document YAML stream ready to apply to a cluster.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
