//! Command-line argument parsing for `qrun`.

use clap::{Args, Parser, Subcommand};
use query_runners::config::Config;
use query_runners::organization::ListSetting;
use query_runners::runner::CallerIdentity;
use std::path::PathBuf;
use std::time::Duration;

/// Default wall-clock limit for one execution, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Run queries against configured data sources through pluggable query runners.
#[derive(Parser, Debug)]
#[command(name = "qrun")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", env = "QRUN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to the log file instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List connector types and whether they are enabled
    Types,

    /// Print the configuration schema of a connector type as JSON
    Settings {
        /// Connector type, e.g. azure_trino
        #[arg(value_name = "TYPE")]
        type_name: String,
    },

    /// List configured data sources
    Sources,

    /// Run a query and print the result payload
    Run(RunArgs),

    /// List tables and columns of a data source
    Tables {
        /// Data source name from the config file
        source: String,

        /// Print the schema as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        limits: Limits,
    },

    /// Check that a data source is reachable with its configured credentials
    Test {
        /// Data source name from the config file
        source: String,

        #[command(flatten)]
        limits: Limits,
    },

    /// Organization management
    #[command(subcommand)]
    Org(OrgCommand),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Data source name from the config file
    pub source: String,

    /// Query text, or "-" to read it from stdin
    pub query: String,

    /// Name of the user the query runs for
    #[arg(long, value_name = "NAME", env = "QRUN_USER_NAME")]
    pub user_name: Option<String>,

    /// Email of the user the query runs for
    #[arg(long, value_name = "EMAIL", env = "QRUN_USER_EMAIL")]
    pub user_email: Option<String>,

    /// Pretty-print the result payload
    #[arg(long)]
    pub pretty: bool,

    #[command(flatten)]
    pub limits: Limits,
}

impl RunArgs {
    /// The caller identity, if either part was given.
    pub fn caller(&self) -> Option<CallerIdentity> {
        if self.user_name.is_none() && self.user_email.is_none() {
            return None;
        }
        Some(CallerIdentity {
            name: self.user_name.clone(),
            email: self.user_email.clone(),
        })
    }
}

#[derive(Args, Debug, Clone, Copy)]
pub struct Limits {
    /// Cancel the execution after this many seconds
    #[arg(long, value_name = "SECS", env = "QRUN_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,
}

impl Limits {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Subcommand, Debug)]
pub enum OrgCommand {
    /// List all organizations
    List,

    /// Create an organization
    Create {
        name: String,
        slug: String,
    },

    /// Replace a list setting with comma separated VALUES
    Set {
        #[arg(value_enum)]
        setting: ListSetting,
        values: String,
    },

    /// Show a list setting
    Show {
        #[arg(value_enum)]
        setting: ListSetting,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }
}
