//! `h5p`: install, inspect and remove H5P content-type libraries.

mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Args::parse();
    logging::init(args.verbose);
    let result = match commands::Context::new(args.config.as_deref()).await {
        Ok(ctx) => commands::run(ctx, args.command).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        },
    }
}
