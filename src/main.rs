//! Ridgeline - main entry point

use clap::Parser;
use ridgeline::cli::{self, Cli};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ridgeline=info".into()),
        )
        .init();

    let args = Cli::parse();
    if let Err(err) = cli::run(args) {
        tracing::error!(error = %err, "command failed");
        std::process::exit(1);
    }
}
