//! tvlink - discover TV receivers on the local network and cast media to them.
//!
//! A thin shell over `tvlink-core`: it supplies the local address, renders the
//! device list and session state, and dispatches media on request.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;

use cli::{Cli, Commands};
use commands::Context;
use error::{exit_codes, CliError};
use output::get_formatter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let json = cli.json;

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            eprintln!("{}", get_formatter(json).format_error(&e.to_string()));
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = Context::load(&cli).await?;

    match cli.command {
        Commands::Discover(args) => commands::run_discover(args, ctx).await,
        Commands::Connect(args) => commands::run_connect(args, ctx).await,
        Commands::Cast(args) => commands::run_cast(args, ctx).await,
        Commands::Config(args) => commands::run_config(args, ctx).await,
    }
}
