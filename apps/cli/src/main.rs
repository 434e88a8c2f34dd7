//! Draftsmith CLI: research-backed drafting from the terminal.
//!
//! Runs the topic → research → write → edit → publish pipeline locally, or
//! serves it over HTTP.

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
