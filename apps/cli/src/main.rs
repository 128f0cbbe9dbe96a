//! esbridge CLI: correlate newline-delimited JSON rows with Elasticsearch
//! documents and push edited rows back as partial updates.
//!
//! Rows are read from stdin and written to stdout; logs and progress go to
//! stderr.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
