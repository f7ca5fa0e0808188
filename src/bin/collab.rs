//! Collab participant binary
//!
//! `collab serve NAME` shares the current directory; `collab receive NAME`
//! follows a live share.

use clap::Parser;
use collab::tooling::cli::{describe_error, Cli};
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.execute().await {
        eprintln!("Error: {}", describe_error(&e));
        process::exit(1);
    }
}
