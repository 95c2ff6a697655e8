//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Taskhub - multi-tenant task tracking
#[derive(Parser, Debug)]
#[command(name = "taskhub")]
#[command(version)]
#[command(about = "Multi-tenant task tracker with recurring tasks and role-based access")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API and the recurrence generator
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the bind address (e.g. 0.0.0.0:8080)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Load and validate configuration, then print the effective values
    CheckConfig {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the permission matrix, or one role's permissions
    Permissions {
        /// Role name (admin, manager, member)
        role: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_overrides() {
        let cli = Cli::try_parse_from(["taskhub", "serve", "--config", "t.toml", "--bind", "0.0.0.0:9000"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Serve { config: Some(_), bind: Some(b) }) if b == "0.0.0.0:9000"
        ));
    }

    #[test]
    fn test_parse_permissions_role_optional() {
        let all = Cli::try_parse_from(["taskhub", "permissions"]);
        assert!(matches!(all.map(|c| c.command), Ok(Commands::Permissions { role: None })));
        let one = Cli::try_parse_from(["taskhub", "permissions", "manager"]);
        assert!(matches!(
            one.map(|c| c.command),
            Ok(Commands::Permissions { role: Some(r) }) if r == "manager"
        ));
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["taskhub", "frobnicate"]).is_err());
    }
}
