//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Response policy zone aggregation server
///
/// Merges whitelists, blacklists and threat-intel greylists into one RPZ
/// zone and serves it to resolvers over AXFR/IXFR.
#[derive(Parser, Debug)]
#[command(name = "rpzd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (TOML); defaults apply when it does not exist
    #[arg(short, long, env = "RPZD_CONFIG", default_value = "rpzd.toml", global = true)]
    pub config: PathBuf,

    /// Log filter, e.g. "info" or "rpz_srv=debug" (RUST_LOG overrides)
    #[arg(short, long, env = "RPZD_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the policy zone (default)
    Serve(ServeArgs),

    /// Validate the configuration and source files, then exit
    CheckConfig,
}

impl Default for Commands {
    fn default() -> Self {
        Self::Serve(ServeArgs::default())
    }
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Override the configured listen address
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_is_default() {
        let cli = Cli::try_parse_from(["rpzd"]).unwrap();
        assert!(cli.command.is_none());
        assert!(matches!(
            cli.command.unwrap_or_default(),
            Commands::Serve(ServeArgs { listen: None })
        ));
    }

    #[test]
    fn test_serve_listen_override() {
        let cli =
            Cli::try_parse_from(["rpzd", "-c", "/etc/rpzd.toml", "serve", "--listen", "127.0.0.1:53"])
                .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/rpzd.toml"));
        match cli.command {
            Some(Commands::Serve(args)) => {
                assert_eq!(args.listen, Some("127.0.0.1:53".parse().unwrap()));
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn test_check_config_subcommand() {
        let cli = Cli::try_parse_from(["rpzd", "check-config", "--log-level", "debug"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
        assert_eq!(cli.log_level, "debug");
    }
}
