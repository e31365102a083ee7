//! System check command implementation.
//!
//! Validates the effective configuration and verifies that the JDK
//! diagnostic tools can be spawned.

use anyhow::bail;
use std::path::PathBuf;

use crate::config::{validate_effective_config, Config};
use crate::discovery::parse_process_list;
use crate::error::ToolError;
use crate::tools::run_with_timeout;

/// Outcome of probing one tool binary.
#[derive(Debug, PartialEq, Eq)]
pub enum ToolProbe {
    Ok,
    /// Spawned but exited non-zero; the binary exists.
    Present(String),
    Missing(String),
}

/// Spawns `program args`; only a spawn failure counts as missing.
pub fn probe_tool(program: &PathBuf, args: &[&str], cfg: &Config) -> ToolProbe {
    match run_with_timeout(program, args, cfg.tool_timeout()) {
        Ok(_) => ToolProbe::Ok,
        Err(e @ ToolError::Spawn { .. }) => ToolProbe::Missing(e.to_string()),
        Err(e) => ToolProbe::Present(e.to_string()),
    }
}

/// Validates system requirements and configuration.
pub fn command_check(config: &Config) -> anyhow::Result<()> {
    println!("JVM GC Exporter - System Check");
    println!("==============================");

    let mut all_ok = true;

    println!("\nChecking configuration...");
    match validate_effective_config(config) {
        Ok(()) => println!("   [ok] Configuration is valid"),
        Err(e) => {
            println!("   [fail] Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\nChecking JDK diagnostic tools...");
    let jps = config.jps_path();
    match run_with_timeout(&jps, &[], config.tool_timeout()) {
        Ok(output) => {
            let jvms = parse_process_list(&output).count();
            println!("   [ok] {} lists {} JVM processes", jps.display(), jvms);
        }
        Err(e) => {
            println!("   [fail] {}", e);
            all_ok = false;
        }
    }

    for (program, args) in [
        (config.jinfo_path(), ["-help"]),
        (config.jstat_path(), ["-options"]),
    ] {
        match probe_tool(&program, &args, config) {
            ToolProbe::Ok => println!("   [ok] {} is available", program.display()),
            ToolProbe::Present(detail) => {
                println!("   [ok] {} is available ({})", program.display(), detail)
            }
            ToolProbe::Missing(detail) => {
                println!("   [fail] {}", detail);
                all_ok = false;
            }
        }
    }

    println!("\nPublishing:");
    println!("   mode: {:?}", config.mode());
    println!("   listen: {}:{}", config.bind(), config.port());
    println!(
        "   gateway: {} (job={}, every {}s)",
        config.gateway_url(),
        config.job_name(),
        config.push_interval().as_secs()
    );
    match config.sd_url.as_deref() {
        Some(url) => println!("   service registry: {}", url),
        None => println!("   service registry: disabled"),
    }

    println!("\nSummary:");
    if all_ok {
        println!("   All checks passed - system is ready");
        Ok(())
    } else {
        bail!("some checks failed");
    }
}
