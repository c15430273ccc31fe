use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "notify",
    version,
    about = "Listen to a notification hub and run connection diagnostics"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Hub URL, overrides the config file
    #[arg(long, global = true, env = "NOTIFY_HUB_URL")]
    pub hub_url: Option<String>,

    /// Bearer token; when absent NOTIFY_ACCESS_TOKEN is read on every connect
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// User id to join the user group for
    #[arg(long, global = true, env = "NOTIFY_USER_ID")]
    pub user_id: Option<String>,

    /// Roles to join role groups for
    #[arg(long = "role", global = true, env = "NOTIFY_ROLES", value_delimiter = ',')]
    pub roles: Vec<String>,

    /// Log filter directive, e.g. "hub_client=debug"
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print notifications as they arrive until interrupted
    Listen {
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Round-trip a no-op hub method
    TestConnection {
        /// Seconds to wait for the connection
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },

    /// Ask the hub to send a notification back and wait for it
    TestNotification {
        /// Seconds to wait for the connection and the notification
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

impl Args {
    /// Filter directive implied by the flags.
    pub fn log_directive(&self) -> Option<String> {
        if self.quiet {
            Some("error".to_string())
        } else if self.verbose {
            Some("notify_center=debug,hub_client=debug,notify_cli=debug".to_string())
        } else {
            self.log_filter.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_listen() {
        let args = Args::try_parse_from([
            "notify",
            "listen",
            "--hub-url",
            "https://api.example.com/hub",
            "--user-id",
            "u1",
            "--role",
            "Admin,Organizer",
        ])
        .unwrap();

        assert!(matches!(args.command, Commands::Listen { duration_secs: None }));
        assert_eq!(args.roles, vec!["Admin", "Organizer"]);
        assert_eq!(args.user_id.as_deref(), Some("u1"));
    }

    #[rstest]
    #[case(&["notify", "-q", "listen"], Some("error"))]
    #[case(&["notify", "--log-filter", "hub_client=trace", "listen"], Some("hub_client=trace"))]
    fn test_log_directive(#[case] argv: &[&str], #[case] expected: Option<&str>) {
        let args = Args::try_parse_from(argv).unwrap();
        assert_eq!(args.log_directive().as_deref(), expected);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["notify", "-v", "-q", "listen"]).is_err());
    }
}
