use crate::growth::GrowthError;
use leakhound_config::{ConfigError, Phase};
use leakhound_driver::DriverError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DetectorError>;

#[derive(Error, Debug)]
pub enum DetectorError {
    /// A step predicate did not become true within the step's wait cap.
    /// Fatal to the current phase.
    #[error("step {phase}[{step}] did not become ready within {timeout_ms} ms")]
    Timeout {
        phase: Phase,
        step: usize,
        timeout_ms: u64,
    },

    /// Every poll while waiting on this step saw `BLeakConfig` undefined.
    /// Distinct from [`DetectorError::Timeout`]: the workload never had a
    /// chance to start, usually because config injection was blocked
    /// (CSP, proxy misconfiguration).
    #[error("BLeakConfig never appeared in the page while waiting on {phase}[{step}]; config injection appears blocked")]
    ConfigNotInjected { phase: Phase, step: usize },

    /// An in-page evaluation failed: a step's `next()` threw, or a driver
    /// eval errored. Fatal to the current phase.
    #[error("page evaluation failed in {context}")]
    PageEval {
        context: String,
        #[source]
        source: DriverError,
    },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("growth analysis error: {0}")]
    Growth(#[from] GrowthError),

    #[error("invalid detector state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
