pub mod toml_config;

pub use toml_config::RelayConfig;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "wx-relay")]
#[command(about = "Relay rtl_433 weather station readings to Weather Underground")]
#[command(version)]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "wx-relay.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Validate the configuration and show the decoder command and translation table
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = CliConfig::parse_from(["wx-relay"]);
        assert_eq!(cli.config, "wx-relay.toml");
        assert!(!cli.verbose);
        assert!(!cli.json_logs);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_flags() {
        let cli = CliConfig::parse_from(["wx-relay", "-c", "/etc/wx.toml", "-v", "--json-logs", "--dry-run"]);
        assert_eq!(cli.config, "/etc/wx.toml");
        assert!(cli.verbose);
        assert!(cli.json_logs);
        assert!(cli.dry_run);
    }
}
