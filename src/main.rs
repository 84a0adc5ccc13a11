mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use thoth_engine::{api, config::Config, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = Config::load(args.config, &args.section)
                .map_err(|e| format!("Failed to load config: {e}"))?;
            observability::init_logging(&config.logging, cli.verbose)?;
            tracing::info!(section = %args.section, "Configuration loaded");

            api::run(config, args.address).await?
        }
    }

    Ok(())
}
