//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use url::Url;

/// Talk to a bearer-token API through the authgate request gateway
#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AUTHGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// API base URL (overrides config)
    #[arg(long, global = true)]
    pub base_url: Option<Url>,

    /// Allow plain http:// targets (local development only)
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log format (overrides config)
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    pub print_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate configuration and exit
    Check,

    /// Show whether a credential is stored
    Status,

    /// Log in and store the issued credential
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "AUTHGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account
    Register {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "AUTHGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the session and forget the stored credential
    Logout,

    /// Show the signed-in user
    Whoami,

    /// GET a resource and print the response body
    Get {
        /// Path relative to the base URL, or an absolute URL
        path: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}
