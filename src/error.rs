//! Error taxonomy for the console bootstrap.
//!
//! Every variant except a focus miss is fatal: it aborts the remaining
//! bootstrap stages and ends up in the page's error banner. A focus miss is
//! not an error at all and is reported through [`crate::map::FocusOutcome`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Stylesheet,
    Script,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Stylesheet => f.write_str("CSS"),
            ResourceKind::Script => f.write_str("script"),
        }
    }
}

#[derive(Debug, Error)]
#[error("Failed to load {kind}: {url} ({reason})")]
pub struct ResourceLoadError {
    pub kind: ResourceKind,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Error)]
#[error("{capability} did not become available within {}ms. Make sure {script} is reachable.", .timeout.as_millis())]
pub struct CapabilityTimeoutError {
    pub capability: String,
    pub script: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("Failed to load {location}: {reason}")]
    Fetch { location: String, reason: String },

    #[error("Failed to load {location}: HTTP {status}")]
    Status { location: String, status: u16 },

    #[error("Failed to parse {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure reported by the mapping engine itself.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        EngineError(message.into())
    }
}

#[derive(Debug, Error)]
pub enum MapInitError {
    #[error("map engine loader not found")]
    LoaderUnavailable,

    #[error("map engine modules failed to load: {0}")]
    Modules(String),

    #[error("map construction failed: {0}")]
    Engine(#[from] EngineError),
}

/// Everything that can end a bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Resource(#[from] ResourceLoadError),

    #[error(transparent)]
    CapabilityTimeout(#[from] CapabilityTimeoutError),

    #[error(transparent)]
    Data(#[from] DataLoadError),

    #[error(transparent)]
    MapInit(#[from] MapInitError),
}
