//! JVM process discovery from `jps` output.

use tracing::debug;

use crate::config::Config;
use crate::error::DiscoveryError;
use crate::tools::DiagnosticTools;

/// Name under which `jps` lists itself.
const LISTING_TOOL_NAME: &str = "Jps";

/// A JVM seen by the enumerator in the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub display_name: String,
}

/// Name based selection of discovered JVMs.
#[derive(Debug, Clone, Default)]
pub struct ProcessFilter {
    pub include_names: Vec<String>,
    pub exclude_names: Vec<String>,
    pub max_processes: Option<usize>,
}

impl ProcessFilter {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            include_names: cfg.include_names.clone().unwrap_or_default(),
            exclude_names: cfg.exclude_names.clone().unwrap_or_default(),
            max_processes: cfg.max_processes,
        }
    }

    /// Determines if a JVM should be collected, by main class name.
    pub fn should_include(&self, name: &str) -> bool {
        if self.exclude_names.iter().any(|s| name.contains(s.as_str())) {
            return false;
        }
        if !self.include_names.is_empty() {
            return self.include_names.iter().any(|s| name.contains(s.as_str()));
        }
        true
    }
}

/// Lazily parses `<pid> <name>` lines, skipping the listing tool itself.
///
/// Lines that do not have exactly two fields (e.g. `4242 -- process
/// information unavailable`) or whose pid is not numeric are ignored.
pub fn parse_process_list(output: &str) -> impl Iterator<Item = ProcessHandle> + '_ {
    output.lines().filter_map(|line| {
        let mut parts = line.split_whitespace();
        let pid = parts.next()?;
        let name = parts.next()?;
        if parts.next().is_some() || name == LISTING_TOOL_NAME {
            return None;
        }
        let pid = pid.parse::<u32>().ok()?;
        Some(ProcessHandle {
            pid,
            display_name: name.to_string(),
        })
    })
}

/// Lists the JVMs on this host that pass `filter`.
pub fn enumerate(
    tools: &dyn DiagnosticTools,
    filter: &ProcessFilter,
) -> Result<Vec<ProcessHandle>, DiscoveryError> {
    let output = tools.list_processes()?;

    let mut handles: Vec<ProcessHandle> = parse_process_list(&output)
        .filter(|h| {
            let keep = filter.should_include(&h.display_name);
            if !keep {
                debug!("Skipping JVM {} ({}): filtered by name config", h.pid, h.display_name);
            }
            keep
        })
        .collect();

    // jps may list a pid twice while a JVM is starting up
    handles.sort_by_key(|h| h.pid);
    handles.dedup_by_key(|h| h.pid);

    if let Some(max) = filter.max_processes {
        handles.truncate(max);
    }

    debug!("Discovered {} JVM processes", handles.len());
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::FakeTools;

    const JPS_OUTPUT: &str = "\
23107 Jps
4711 BillingApplication
4712 org.apache.catalina.startup.Bootstrap
9001 -- process information unavailable
abc Broken

";

    #[test]
    fn test_parse_process_list_skips_jps_and_junk() {
        let handles: Vec<_> = parse_process_list(JPS_OUTPUT).collect();
        assert_eq!(
            handles,
            vec![
                ProcessHandle {
                    pid: 4711,
                    display_name: "BillingApplication".into()
                },
                ProcessHandle {
                    pid: 4712,
                    display_name: "org.apache.catalina.startup.Bootstrap".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_empty_output() {
        assert_eq!(parse_process_list("").count(), 0);
        assert_eq!(parse_process_list("12 Jps\n").count(), 0);
    }

    #[test]
    fn test_filter_include_exclude() {
        let filter = ProcessFilter {
            include_names: vec!["Billing".into(), "Bootstrap".into()],
            exclude_names: vec!["catalina".into()],
            max_processes: None,
        };
        assert!(filter.should_include("BillingApplication"));
        assert!(!filter.should_include("org.apache.catalina.startup.Bootstrap"));
        assert!(!filter.should_include("Kafka"));
        assert!(ProcessFilter::default().should_include("Kafka"));
    }

    #[test]
    fn test_enumerate_applies_filter_and_limit() {
        let tools = FakeTools::default();
        tools.set_listing("30 C\n10 A\n20 B\n10 A\n");
        let filter = ProcessFilter {
            max_processes: Some(2),
            ..ProcessFilter::default()
        };
        let pids: Vec<u32> = enumerate(&tools, &filter)
            .unwrap()
            .into_iter()
            .map(|h| h.pid)
            .collect();
        assert_eq!(pids, vec![10, 20]);
    }

    #[test]
    fn test_enumerate_reports_tool_failure() {
        let tools = FakeTools::default();
        tools.fail_listing();
        assert!(enumerate(&tools, &ProcessFilter::default()).is_err());
    }
}
