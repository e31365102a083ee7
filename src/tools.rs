//! Invocation of the JDK diagnostic tools.
//!
//! The exporter never reimplements JVM attach logic. It spawns `jps`, `jinfo`
//! and `jstat` directly (argument vectors, no shell) and hands their raw text
//! output to the parsers in [`crate::discovery`] and [`crate::extract`].

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::ToolError;

/// Interval between exit checks once stdout has closed.
const EXIT_POLL: Duration = Duration::from_millis(5);

/// Source of line-oriented diagnostic output for JVM processes.
///
/// Implementations must be callable from several rayon workers at once.
pub trait DiagnosticTools: Send + Sync {
    /// `<pid> <name>` lines, one per JVM on the host.
    fn list_processes(&self) -> Result<String, ToolError>;

    /// `key=value` system property lines of `pid`.
    fn system_properties(&self, pid: u32) -> Result<String, ToolError>;

    /// VM flags of `pid`, including `-XX:MaxHeapSize=<bytes>`.
    fn vm_flags(&self, pid: u32) -> Result<String, ToolError>;

    /// Two-line header/value GC capacity table of `pid`.
    fn gc_stats(&self, pid: u32) -> Result<String, ToolError>;
}

/// [`DiagnosticTools`] backed by the JDK command line tools.
#[derive(Debug, Clone)]
pub struct JdkTools {
    pub jps: PathBuf,
    pub jinfo: PathBuf,
    pub jstat: PathBuf,
    pub timeout: Duration,
}

impl JdkTools {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            jps: cfg.jps_path(),
            jinfo: cfg.jinfo_path(),
            jstat: cfg.jstat_path(),
            timeout: cfg.tool_timeout(),
        }
    }

    fn run(&self, program: &PathBuf, args: &[&str]) -> Result<String, ToolError> {
        run_with_timeout(program, args, self.timeout)
    }
}

impl DiagnosticTools for JdkTools {
    fn list_processes(&self) -> Result<String, ToolError> {
        self.run(&self.jps, &[])
    }

    fn system_properties(&self, pid: u32) -> Result<String, ToolError> {
        self.run(&self.jinfo, &["-sysprops", &pid.to_string()])
    }

    fn vm_flags(&self, pid: u32) -> Result<String, ToolError> {
        self.run(&self.jinfo, &["-flags", &pid.to_string()])
    }

    fn gc_stats(&self, pid: u32) -> Result<String, ToolError> {
        self.run(&self.jstat, &["-gc", &pid.to_string()])
    }
}

/// Runs `program` with `args` and returns its stdout.
///
/// Stderr is discarded. Stdout is drained on a helper thread while this
/// thread keeps the [`Child`], so a hung attach can be bounded: once
/// `timeout` elapses the child is killed and reaped here. The child is never
/// signalled after it has been reaped.
pub fn run_with_timeout(
    program: &PathBuf,
    args: &[&str],
    timeout: Duration,
) -> Result<String, ToolError> {
    let program_name = program.display().to_string();
    trace!("Spawning {} {:?}", program_name, args);

    let deadline = Instant::now() + timeout;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: program_name.clone(),
            source,
        })?;

    let Some(mut pipe) = child.stdout.take() else {
        kill_and_reap(&mut child);
        return Err(ToolError::Spawn {
            program: program_name,
            source: io::Error::other("stdout was not captured"),
        });
    };

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = tx.send(pipe.read_to_end(&mut buf).map(|_| buf));
    });

    let stdout = match rx.recv_timeout(timeout) {
        Ok(Ok(stdout)) => stdout,
        Ok(Err(source)) => {
            kill_and_reap(&mut child);
            return Err(ToolError::Spawn {
                program: program_name,
                source,
            });
        }
        Err(_) => return Err(timed_out(&mut child, program_name, timeout)),
    };

    // stdout can close before the process exits
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
            Ok(None) => return Err(timed_out(&mut child, program_name, timeout)),
            Err(source) => {
                kill_and_reap(&mut child);
                return Err(ToolError::Spawn {
                    program: program_name,
                    source,
                });
            }
        }
    };
    let output = Output {
        status,
        stdout,
        stderr: Vec::new(),
    };

    if !output.status.success() {
        return Err(ToolError::NonZeroExit {
            program: program_name,
            status: output.status.to_string(),
        });
    }

    let text = String::from_utf8(output.stdout).map_err(|_| ToolError::InvalidOutput {
        program: program_name.clone(),
    })?;
    debug!("{} {:?} returned {} bytes", program_name, args, text.len());
    Ok(text)
}

fn timed_out(child: &mut Child, program: String, timeout: Duration) -> ToolError {
    warn!(
        "{} (child pid {}) exceeded {:?}, killing it",
        program,
        child.id(),
        timeout
    );
    kill_and_reap(child);
    ToolError::Timeout { program, timeout }
}

/// Kills a child that has not been reaped yet and waits for it.
fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("kill of child pid {} failed: {}", child.id(), e);
    }
    let _ = child.wait();
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`DiagnosticTools`] used by the collector and handler tests.

    use super::*;
    use ahash::AHashMap as HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Canned per-pid answers; a missing entry means the invocation fails.
    #[derive(Default)]
    pub struct FakeTools {
        pub listing: Mutex<Option<String>>,
        pub sysprops: Mutex<HashMap<u32, String>>,
        pub flags: Mutex<HashMap<u32, String>>,
        pub gc: Mutex<HashMap<u32, String>>,
        pub list_calls: AtomicUsize,
        pub sysprops_calls: AtomicUsize,
        pub flags_calls: AtomicUsize,
        pub gc_calls: AtomicUsize,
    }

    fn failed(program: &str) -> ToolError {
        ToolError::NonZeroExit {
            program: program.to_string(),
            status: "exit status: 1".to_string(),
        }
    }

    impl FakeTools {
        pub fn set_listing(&self, listing: &str) {
            *self.listing.lock().unwrap() = Some(listing.to_string());
        }

        pub fn fail_listing(&self) {
            *self.listing.lock().unwrap() = None;
        }

        /// Registers a JVM answering all three queries.
        pub fn add_jvm(&self, pid: u32, sysprops: &str, flags: &str, gc: &str) {
            self.sysprops.lock().unwrap().insert(pid, sysprops.to_string());
            self.flags.lock().unwrap().insert(pid, flags.to_string());
            self.gc.lock().unwrap().insert(pid, gc.to_string());
        }

        pub fn remove_jvm(&self, pid: u32) {
            self.sysprops.lock().unwrap().remove(&pid);
            self.flags.lock().unwrap().remove(&pid);
            self.gc.lock().unwrap().remove(&pid);
        }

        pub fn calls(&self) -> (usize, usize, usize) {
            (
                self.sysprops_calls.load(Ordering::SeqCst),
                self.flags_calls.load(Ordering::SeqCst),
                self.gc_calls.load(Ordering::SeqCst),
            )
        }
    }

    impl DiagnosticTools for FakeTools {
        fn list_processes(&self) -> Result<String, ToolError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.listing.lock().unwrap().clone().ok_or_else(|| failed("jps"))
        }

        fn system_properties(&self, pid: u32) -> Result<String, ToolError> {
            self.sysprops_calls.fetch_add(1, Ordering::SeqCst);
            self.sysprops
                .lock()
                .unwrap()
                .get(&pid)
                .cloned()
                .ok_or_else(|| failed("jinfo"))
        }

        fn vm_flags(&self, pid: u32) -> Result<String, ToolError> {
            self.flags_calls.fetch_add(1, Ordering::SeqCst);
            self.flags
                .lock()
                .unwrap()
                .get(&pid)
                .cloned()
                .ok_or_else(|| failed("jinfo"))
        }

        fn gc_stats(&self, pid: u32) -> Result<String, ToolError> {
            self.gc_calls.fetch_add(1, Ordering::SeqCst);
            self.gc
                .lock()
                .unwrap()
                .get(&pid)
                .cloned()
                .ok_or_else(|| failed("jstat"))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let out = run_with_timeout(
            &PathBuf::from("echo"),
            &["12345", "Main"],
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(out.trim(), "12345 Main");
    }

    #[test]
    fn test_run_missing_program() {
        let err = run_with_timeout(
            &PathBuf::from("/nonexistent/definitely-not-jps"),
            &[],
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn test_run_non_zero_exit() {
        let err = run_with_timeout(&PathBuf::from("false"), &[], Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, ToolError::NonZeroExit { .. }));
    }

    #[test]
    fn test_run_times_out() {
        let start = std::time::Instant::now();
        let err = run_with_timeout(&PathBuf::from("sleep"), &["5"], Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_run_times_out_after_stdout_closes() {
        let start = std::time::Instant::now();
        let err = run_with_timeout(
            &PathBuf::from("sh"),
            &["-c", "exec >&-; sleep 5"],
            Duration::from_millis(200),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_run_waits_for_exit_after_stdout_closes() {
        let out = run_with_timeout(
            &PathBuf::from("sh"),
            &["-c", "echo ready; exec >&-; sleep 0.1"],
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(out.trim(), "ready");
    }
}
