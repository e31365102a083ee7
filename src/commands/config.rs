//! Config command implementation.
//!
//! Generates configuration files and renders the effective configuration.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::Config;

/// Serializes `config` in the requested format.
pub fn render_config(config: &Config, format: &ConfigFormat) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("jvm-gc-exporter.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# JVM GC Exporter Configuration
# ==============================
#
# Every option can be omitted; CLI flags and environment variables win
# over this file.
#
# Publishing
# ----------
# mode: pull                   # pull (serve /metrics) or push (Pushgateway)
# bind: "0.0.0.0"              # Bind IP, pull mode           (BIND_ADDR)
# port: 9100                   # HTTP port / announced port   (SERVICE_PORT)
# enable_health: true          # Serve /health
#
# Push Mode
# ---------
# gateway_url: "http://pushgateway:9091"   # (PUSHGATEWAY_URL)
# push_interval_seconds: 15    # Seconds between cycles       (PUSH_INTERVAL_SECONDS)
# job_name: jvm_metrics_pusher # Pushgateway job              (JOB_NAME)
# instance: null               # instance label, null = host name (INSTANCE)
#
# Service Registry (pull mode)
# ----------------------------
# sd_url: null                 # POST/DELETE endpoint, null = disabled (SD_API_URL)
# service_host: null           # Announced host, null = resolved IP   (SERVICE_HOST)
# sd_labels:
#   job: docker-metrics-service
#
# JVM Identity
# ------------
# app_name_property: com.netfolio.appname   # -> appname label
# variant_property: com.netfolio.fullname   # -> variant label
#
# Diagnostic Tools
# ----------------
# jps_path: jps
# jinfo_path: jinfo
# jstat_path: jstat
# tool_timeout_seconds: 10     # Per invocation; SIGKILL on expiry (TOOL_TIMEOUT_SECONDS)
# parallelism: null            # Extraction threads (null = auto)
#
# Process Selection
# -----------------
# include_names: null          # Only JVMs whose main class contains one of these
# exclude_names: null          # Skip JVMs whose main class contains one of these
# max_processes: null          # Cap per cycle
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
