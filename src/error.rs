//! Error taxonomy for the exporter.
//!
//! Every error below the lifecycle layer is absorbed and logged; only
//! configuration errors and listener bind failures terminate the process.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single diagnostic tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}")]
    NonZeroExit { program: String, status: String },

    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("`{program}` produced non UTF-8 output")]
    InvalidOutput { program: String },
}

/// The process enumerator could not list JVM processes this cycle.
#[derive(Debug, Error)]
#[error("process discovery failed: {0}")]
pub struct DiscoveryError(#[from] pub ToolError);

/// Which per-process attribute an extraction was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Identity,
    Heap,
    Gc,
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Identity => "identity",
            AttributeKind::Heap => "heap",
            AttributeKind::Gc => "gc",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-process, per-attribute extraction failure.
#[derive(Debug, Error)]
#[error("{kind} extraction failed for pid {pid}: {source}")]
pub struct ExtractionError {
    pub pid: u32,
    pub kind: AttributeKind,
    #[source]
    pub source: ToolError,
}

/// Publishing a snapshot failed (encoding or transmission).
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected push with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Announcing to or withdrawing from the service registry failed.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry answered with status {0}")]
    Rejected(u16),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
