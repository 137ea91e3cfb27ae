//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// canopy - reconcile parents against the children their definitions declare
#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(version)]
#[command(about = "Reconcile parent resources against their declared children")]
#[command(
    long_about = "canopy runs reconciliation passes over a fixture world held in memory and prints the resulting parent statuses as JSON."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run reconciliation passes over a fixture world
    Reconcile {
        /// Fixture file (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        fixture: PathBuf,

        /// Reconciler configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of passes; stops earlier once nothing changes
        #[arg(short, long, default_value_t = 1)]
        passes: u32,

        /// Also print the children left in the store
        #[arg(long, default_value_t = false)]
        children: bool,
    },

    /// Validate a reconciler configuration file
    CheckConfig {
        /// Configuration file (TOML)
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_reconcile_defaults() {
        let cli = Cli::try_parse_from(["canopy", "reconcile", "--fixture", "world.yaml"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Reconcile {
                ref fixture,
                config: None,
                passes: 1,
                children: false,
            } if *fixture == PathBuf::from("world.yaml")
        ));
    }

    #[test]
    fn test_reconcile_flags() {
        let cli = Cli::try_parse_from([
            "canopy", "reconcile", "-f", "w.yaml", "-c", "c.toml", "-p", "3", "--children",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Reconcile {
                config: Some(_),
                passes: 3,
                children: true,
                ..
            }
        ));
    }

    #[test]
    fn test_check_config_takes_a_path() {
        let cli = Cli::try_parse_from(["canopy", "check-config", "canopy.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckConfig { path } if path == PathBuf::from("canopy.toml")));
    }

    #[test]
    fn test_fixture_is_required() {
        assert!(Cli::try_parse_from(["canopy", "reconcile"]).is_err());
    }
}
