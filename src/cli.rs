use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use thoth_engine::config::DEFAULT_SECTION;

#[derive(Parser, Debug)]
#[command(name = "thoth-engine", version)]
#[command(about = "File ingestion and worker dispatch engine", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ingest HTTP server
    Server(ServerArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Configuration file (falls back to ENGINE_CONFIG, then config/engine.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Section of the configuration file to use
    #[arg(short, long, default_value = DEFAULT_SECTION)]
    pub section: String,

    /// Overrides `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_args() {
        let cli = Cli::parse_from([
            "thoth-engine",
            "-vv",
            "server",
            "--config",
            "/etc/thoth/engine.toml",
            "--section",
            "lab",
            "--address",
            "127.0.0.1:9000",
        ]);

        assert_eq!(cli.verbose, 2);
        let Commands::Server(args) = cli.command;
        assert_eq!(args.config, Some(PathBuf::from("/etc/thoth/engine.toml")));
        assert_eq!(args.section, "lab");
        assert_eq!(args.address, Some("127.0.0.1:9000".parse().unwrap()));
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["thoth-engine", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);

        let err = Cli::try_parse_from(["thoth-engine", "-V"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_server_defaults() {
        let cli = Cli::parse_from(["thoth-engine", "server"]);

        let Commands::Server(args) = cli.command;
        assert_eq!(args.config, None);
        assert_eq!(args.section, DEFAULT_SECTION);
        assert_eq!(args.address, None);
    }
}
