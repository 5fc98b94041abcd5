//! rpmrepo - yum repositories on object storage

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rpmrepo_cli::cmd;
use rpmrepo_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Index { runtime } => cmd::index::index(&runtime).await,
        Commands::SignPackage {
            runtime,
            signing,
            target,
        } => cmd::sign::sign_package(&runtime, &signing, &target).await,
        Commands::SignMetadata { runtime, signing } => {
            cmd::sign::sign_metadata(&runtime, &signing).await
        }
        Commands::Verify {
            file,
            key,
            signature,
        } => cmd::verify::verify(&file, &key, signature.as_deref()),
    };

    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "command failed");
    }
    result
}
