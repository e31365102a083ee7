//! Configuration loading, layering and validation.
//!
//! Precedence: CLI flag or environment variable > config file > built-in
//! default. Every option is optional; the accessors below resolve the
//! effective value.

use clap::ValueEnum;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cli::Args;
use crate::error::ConfigError;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9100;
pub const DEFAULT_GATEWAY_URL: &str = "http://pushgateway:9091";
pub const DEFAULT_PUSH_INTERVAL: u64 = 15;
pub const DEFAULT_JOB_NAME: &str = "jvm_metrics_pusher";
pub const DEFAULT_TOOL_TIMEOUT: u64 = 10;
pub const DEFAULT_APP_NAME_PROPERTY: &str = "com.netfolio.appname";
pub const DEFAULT_VARIANT_PROPERTY: &str = "com.netfolio.fullname";
pub const DEFAULT_SD_JOB_LABEL: &str = "docker-metrics-service";

/// Host name of the machine, read once.
pub static HOSTNAME: Lazy<String> = Lazy::new(read_hostname);

fn read_hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates on
    // success when the name fits, and the last byte stays 0 otherwise.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len() - 1) };
    if rc != 0 {
        return "localhost".to_string();
    }
    CStr::from_bytes_until_nul(&buf)
        .ok()
        .and_then(|c| c.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "localhost".to_string())
}

/// How collected snapshots are published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Serve `/metrics`, collecting on every scrape.
    #[default]
    Pull,
    /// Collect on a timer and push to a Pushgateway.
    Push,
}

/// Exporter configuration as read from file, environment and CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub mode: Option<Mode>,

    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub enable_health: Option<bool>,

    // Push mode
    #[serde(alias = "pushgateway_url")]
    pub gateway_url: Option<String>,
    pub push_interval_seconds: Option<u64>,
    pub job_name: Option<String>,
    pub instance: Option<String>,

    // Service registry
    #[serde(alias = "sd_api_url")]
    pub sd_url: Option<String>,
    pub service_host: Option<String>,

    // Identity properties read from `jinfo -sysprops`
    pub app_name_property: Option<String>,
    pub variant_property: Option<String>,

    // Diagnostic tools
    pub jps_path: Option<PathBuf>,
    pub jinfo_path: Option<PathBuf>,
    pub jstat_path: Option<PathBuf>,
    pub tool_timeout_seconds: Option<u64>,
    pub parallelism: Option<usize>,

    // Process selection
    pub include_names: Option<Vec<String>>,
    pub exclude_names: Option<Vec<String>>,
    pub max_processes: Option<usize>,

    // Logging
    pub log_level: Option<String>,

    /// Labels sent along with the registry announcement.
    pub sd_labels: Option<BTreeMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        let mut sd_labels = BTreeMap::new();
        sd_labels.insert("job".to_string(), DEFAULT_SD_JOB_LABEL.to_string());

        Self {
            mode: Some(Mode::Pull),
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            enable_health: Some(true),
            gateway_url: Some(DEFAULT_GATEWAY_URL.to_string()),
            push_interval_seconds: Some(DEFAULT_PUSH_INTERVAL),
            job_name: Some(DEFAULT_JOB_NAME.to_string()),
            instance: None,
            sd_url: None,
            service_host: None,
            app_name_property: Some(DEFAULT_APP_NAME_PROPERTY.to_string()),
            variant_property: Some(DEFAULT_VARIANT_PROPERTY.to_string()),
            jps_path: Some(PathBuf::from("jps")),
            jinfo_path: Some(PathBuf::from("jinfo")),
            jstat_path: Some(PathBuf::from("jstat")),
            tool_timeout_seconds: Some(DEFAULT_TOOL_TIMEOUT),
            parallelism: None,
            include_names: None,
            exclude_names: None,
            max_processes: None,
            log_level: Some("info".into()),
            sd_labels: Some(sd_labels),
        }
    }
}

impl Config {
    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    pub fn gateway_url(&self) -> &str {
        self.gateway_url.as_deref().unwrap_or(DEFAULT_GATEWAY_URL)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_seconds.unwrap_or(DEFAULT_PUSH_INTERVAL))
    }

    pub fn job_name(&self) -> &str {
        self.job_name.as_deref().unwrap_or(DEFAULT_JOB_NAME)
    }

    /// Instance label, falling back to the host name.
    pub fn instance(&self) -> String {
        self.instance
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| HOSTNAME.clone())
    }

    pub fn app_name_property(&self) -> &str {
        self.app_name_property
            .as_deref()
            .unwrap_or(DEFAULT_APP_NAME_PROPERTY)
    }

    pub fn variant_property(&self) -> &str {
        self.variant_property
            .as_deref()
            .unwrap_or(DEFAULT_VARIANT_PROPERTY)
    }

    pub fn jps_path(&self) -> PathBuf {
        self.jps_path.clone().unwrap_or_else(|| PathBuf::from("jps"))
    }

    pub fn jinfo_path(&self) -> PathBuf {
        self.jinfo_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("jinfo"))
    }

    pub fn jstat_path(&self) -> PathBuf {
        self.jstat_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("jstat"))
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds.unwrap_or(DEFAULT_TOOL_TIMEOUT))
    }

    pub fn sd_labels(&self) -> BTreeMap<String, String> {
        self.sd_labels.clone().unwrap_or_else(|| {
            let mut labels = BTreeMap::new();
            labels.insert("job".to_string(), DEFAULT_SD_JOB_LABEL.to_string());
            labels
        })
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.push_interval_seconds == Some(0) {
        return Err(ConfigError::Invalid(
            "push_interval_seconds must be greater than 0".into(),
        ));
    }
    if cfg.tool_timeout_seconds == Some(0) {
        return Err(ConfigError::Invalid(
            "tool_timeout_seconds must be greater than 0".into(),
        ));
    }

    let job = cfg.job_name();
    if job.trim().is_empty() || job.contains('/') {
        return Err(ConfigError::Invalid(format!(
            "job_name '{}' must be non-empty and must not contain '/'",
            job
        )));
    }

    let instance = cfg.instance();
    if instance.contains('/') {
        return Err(ConfigError::Invalid(format!(
            "instance '{}' must not contain '/'",
            instance
        )));
    }

    check_url("gateway_url", cfg.gateway_url())?;
    if let Some(sd) = cfg.sd_url.as_deref() {
        check_url("sd_url", sd)?;
    }

    if cfg.bind().parse::<std::net::IpAddr>().is_err() {
        return Err(ConfigError::Invalid(format!(
            "bind '{}' is not an IP address",
            cfg.bind()
        )));
    }

    if let Some(level) = cfg.log_level.as_deref() {
        match level {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                    other
                )))
            }
        }
    }

    Ok(())
}

fn check_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} '{}' must start with http:// or https://",
            field, url
        )))
    }
}

/// Resolves configuration from CLI args/env, config file, and defaults.
pub fn resolve_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(mode) = args.mode {
        config.mode = Some(mode);
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(url) = &args.gateway_url {
        config.gateway_url = Some(url.clone());
    }
    if let Some(secs) = args.push_interval {
        config.push_interval_seconds = Some(secs);
    }
    if let Some(job) = &args.job_name {
        config.job_name = Some(job.clone());
    }
    if let Some(instance) = &args.instance {
        config.instance = Some(instance.clone());
    }
    if let Some(sd) = &args.sd_url {
        config.sd_url = Some(sd.clone());
    }
    if let Some(host) = &args.service_host {
        config.service_host = Some(host.clone());
    }
    if let Some(secs) = args.tool_timeout {
        config.tool_timeout_seconds = Some(secs);
    }
    if args.parallelism.is_some() {
        config.parallelism = args.parallelism;
    }
    if args.max_processes.is_some() {
        config.max_processes = args.max_processes;
    }

    // Parse comma-separated include/exclude names
    if let Some(include_str) = &args.include_names {
        config.include_names = Some(split_names(include_str));
    }
    if let Some(exclude_str) = &args.exclude_names {
        config.exclude_names = Some(split_names(exclude_str));
    }

    if args.disable_health {
        config.enable_health = Some(false);
    }
    if let Some(level) = args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    Ok(config)
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Loads a config file (YAML, JSON or TOML by extension).
///
/// Without an explicit path the default locations are tried in order; if none
/// exists the built-in defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/jvm-gc-exporter/config.yaml",
                "/etc/jvm-gc-exporter/config.yml",
                "/etc/jvm-gc-exporter/config.json",
                "./jvm-gc-exporter.yaml",
                "./jvm-gc-exporter.yml",
                "./jvm-gc-exporter.json",
            ];
            match defaults.iter().map(Path::new).find(|p| p.exists()) {
                Some(p) => p.to_path_buf(),
                None => return Ok(Config::default()),
            }
        }
    };

    let path_str = path.display().to_string();
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path_str.clone(),
        source,
    })?;

    let parsed = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str::<Config>(&content).map_err(|e| e.to_string()),
        Some("toml") => toml::from_str::<Config>(&content).map_err(|e| e.to_string()),
        _ => serde_yaml::from_str::<Config>(&content).map_err(|e| e.to_string()),
    };

    let loaded = parsed.map_err(|message| ConfigError::Parse {
        path: path_str.clone(),
        message,
    })?;
    info!("Loaded configuration from: {}", path_str);

    Ok(merge_with_defaults(loaded))
}

/// Fills options the file left out with the built-in defaults.
fn merge_with_defaults(file: Config) -> Config {
    let d = Config::default();
    Config {
        mode: file.mode.or(d.mode),
        port: file.port.or(d.port),
        bind: file.bind.or(d.bind),
        enable_health: file.enable_health.or(d.enable_health),
        gateway_url: file.gateway_url.or(d.gateway_url),
        push_interval_seconds: file.push_interval_seconds.or(d.push_interval_seconds),
        job_name: file.job_name.or(d.job_name),
        instance: file.instance.or(d.instance),
        sd_url: file.sd_url.or(d.sd_url),
        service_host: file.service_host.or(d.service_host),
        app_name_property: file.app_name_property.or(d.app_name_property),
        variant_property: file.variant_property.or(d.variant_property),
        jps_path: file.jps_path.or(d.jps_path),
        jinfo_path: file.jinfo_path.or(d.jinfo_path),
        jstat_path: file.jstat_path.or(d.jstat_path),
        tool_timeout_seconds: file.tool_timeout_seconds.or(d.tool_timeout_seconds),
        parallelism: file.parallelism.or(d.parallelism),
        include_names: file.include_names.or(d.include_names),
        exclude_names: file.exclude_names.or(d.exclude_names),
        max_processes: file.max_processes.or(d.max_processes),
        log_level: file.log_level.or(d.log_level),
        sd_labels: file.sd_labels.or(d.sd_labels),
    }
}
