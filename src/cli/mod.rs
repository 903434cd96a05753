//! CLI for tubeauth.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// tubeauth CLI
#[derive(Parser, Debug)]
#[command(name = "tubeauth", version, about = "YouTube TV device-code login")]
pub struct Cli {
    /// Directory holding auth_tokens.toml (default: ~/.tubeauth)
    #[arg(long, global = true, env = "TUBEAUTH_TOKEN_DIR")]
    pub token_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with a device code
    Login,
    /// Show whether tokens are stored and when they expire
    Status,
    /// Print a valid access token, refreshing if needed
    Token,
    /// Show the signed-in account
    Account,
    /// Delete stored tokens
    Logout,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_login() {
        let cli = Cli::try_parse_from(["tubeauth", "login"]).unwrap();
        assert!(matches!(cli.command, Commands::Login));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tubeauth",
            "status",
            "--token-dir",
            "/tmp/tokens",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.token_dir, Some(PathBuf::from("/tmp/tokens")));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["tubeauth"]).is_err());
    }

    #[test]
    fn parse_unknown_log_format_is_error() {
        assert!(Cli::try_parse_from(["tubeauth", "token", "--log-format", "xml"]).is_err());
    }
}
