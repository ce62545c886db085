use clap::Parser;
use tracing_subscriber::EnvFilter;

use ccmon::config::{Cli, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ccmon=info")))
        .init();

    let cli = Cli::parse();
    let run_server = cli.server;
    let config = Config::load(cli)?;

    if run_server {
        if let Err(e) = ccmon::server::run(config).await {
            tracing::error!(error = %e, "server exited with error");
            return Err(e);
        }
        Ok(())
    } else {
        // The terminal dashboard renderer is an external collaborator;
        // this binary only exposes the query client it would consume.
        tracing::info!(
            "dashboard mode is not implemented by this binary; run with --server to start the collector"
        );
        Ok(())
    }
}
