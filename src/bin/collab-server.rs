//! Collab coordination service binary

use clap::Parser;
use collab::tooling::cli::ServerCli;
use std::process;

#[tokio::main]
async fn main() {
    let cli = ServerCli::parse();

    if let Err(e) = cli.execute().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
