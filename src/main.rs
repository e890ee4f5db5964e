//! Armar CLI — minimal, idempotent infrastructure provisioner.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "armar",
    version,
    about = "Minimal, idempotent infrastructure provisioner — dependency-ordered, registry-backed"
)]
struct Cli {
    #[command(subcommand)]
    command: armar::cli::Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let adapter = armar::cli::default_adapter();
    if let Err(e) = armar::cli::dispatch(cli.command, &adapter).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
