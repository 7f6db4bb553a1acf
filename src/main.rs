use anyhow::Result;
use clap::Parser;
use fundlens::cli::{runner, Cli};

fn main() -> Result<()> {
    // Initialize logging; RUST_LOG controls verbosity
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    runner::run(cli)
}
