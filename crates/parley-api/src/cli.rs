//! CLI definitions for the `parley` binary.

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Realtime AI chat relay.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Detailed output (-v for debug in Parley crates, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the WebSocket relay server.
    Serve {
        /// Port to listen on (overrides config.toml).
        #[arg(long, short)]
        port: Option<u16>,

        /// Host to bind to (overrides config.toml).
        #[arg(long)]
        host: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["parley", "-vv", "serve", "--port", "4000"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(!cli.otel);
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, Some(4000));
                assert!(host.is_none());
            }
            Commands::Completions { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_otel_flag() {
        let cli = Cli::try_parse_from(["parley", "serve", "--otel"]).unwrap();
        assert!(cli.otel);
    }
}
