//! CLI arguments and subcommands for jvm-gc-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands. Options that deployments
//! usually set through the container environment also read their env var.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::config::Mode;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, Default, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug, Default)]
#[command(
    name = "jvm-gc-exporter",
    about = "Prometheus exporter for JVM heap ceiling and GC generation metrics",
    long_about = "Prometheus exporter for JVM heap ceiling and GC generation metrics.\n\n\
                  Discovers running JVMs with jps, reads identity labels and the maximum \
                  heap size with jinfo and generation capacities with jstat -gc, and either \
                  serves them on /metrics or pushes them to a Prometheus Pushgateway.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Publishing mode: serve /metrics (pull) or push to a gateway (push)
    #[arg(short = 'm', long, value_enum, env = "EXPORTER_MODE")]
    pub mode: Option<Mode>,

    /// HTTP listen port (pull mode) and announced service port
    #[arg(short = 'p', long, env = "SERVICE_PORT")]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long, env = "BIND_ADDR")]
    pub bind: Option<IpAddr>,

    /// Pushgateway base URL (push mode)
    #[arg(long, env = "PUSHGATEWAY_URL")]
    pub gateway_url: Option<String>,

    /// Seconds between push cycles (push mode)
    #[arg(long, env = "PUSH_INTERVAL_SECONDS")]
    pub push_interval: Option<u64>,

    /// Job name used as the Pushgateway grouping key
    #[arg(long, env = "JOB_NAME")]
    pub job_name: Option<String>,

    /// Instance label attached to pushed series (defaults to the host name)
    #[arg(long, env = "INSTANCE")]
    pub instance: Option<String>,

    /// Service registry endpoint to announce this exporter to (pull mode)
    #[arg(long, env = "SD_API_URL")]
    pub sd_url: Option<String>,

    /// Host announced to the service registry (defaults to the resolved host IP)
    #[arg(long, env = "SERVICE_HOST")]
    pub service_host: Option<String>,

    /// Timeout in seconds for a single jps/jinfo/jstat invocation
    #[arg(long, env = "TOOL_TIMEOUT_SECONDS")]
    pub tool_timeout: Option<u64>,

    /// Parallel extraction threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Include only JVMs whose main class matches these names (comma-separated)
    #[arg(long)]
    pub include_names: Option<String>,

    /// Exclude JVMs whose main class matches these names (comma-separated)
    #[arg(long)]
    pub exclude_names: Option<String>,

    /// Maximum number of JVMs to collect per cycle
    #[arg(long)]
    pub max_processes: Option<usize>,

    /// Log level (overrides log_level from the config file; default info)
    #[arg(long, value_enum, env = "LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and check that the JDK tools are usable
    Check,

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run a single collection cycle and print the exposition text
    Once {
        /// Also print a per-JVM summary to stderr
        #[arg(long)]
        verbose: bool,
    },
}
