use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::api::DEFAULT_API_ROOT;
use crate::config::SettlePolicy;
use crate::router;

/// Global options. The command itself (`machines`, `sherlocks f ...`) is
/// collected verbatim and handed to the router.
#[derive(Debug, Parser)]
#[command(
    name = "htb",
    version,
    about = "Command-line client for Hack The Box machines, release arena and sherlocks.",
    after_help = router::usage()
)]
pub struct Cli {
    /// API token; overrides the token file.
    #[arg(long, env = "HTB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Dotenv-style file holding `token=<value>`.
    #[arg(long, env = "HTB_ENV_FILE", value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// API root; version segments (`v4`, `v5`) are appended.
    #[arg(long, env = "HTB_API_URL", default_value = DEFAULT_API_ROOT, value_name = "URL")]
    pub api_url: String,

    /// Route every request through this proxy.
    #[arg(long, env = "HTB_PROXY", value_name = "URL")]
    pub proxy: Option<String>,

    /// Skip TLS certificate verification.
    #[arg(short = 'k', long, env = "HTB_INSECURE")]
    pub insecure: bool,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub timeout: u64,

    /// How many times to re-check a spawned release machine.
    #[arg(long, default_value_t = SettlePolicy::DEFAULT_ATTEMPTS, value_name = "N")]
    pub settle_attempts: u32,

    /// Pause before each re-check, in milliseconds.
    #[arg(
        long,
        default_value_t = SettlePolicy::DEFAULT_INTERVAL.as_millis() as u64,
        value_name = "MS"
    )]
    pub settle_interval_ms: u64,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Command and its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}
