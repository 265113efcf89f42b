use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

/// Failures surfaced by a browser driver or interception proxy backend.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The page threw while evaluating a script. Carries the page-side
    /// exception text verbatim.
    #[error("page evaluation failed: {0}")]
    Eval(String),

    /// The browser connection was lost (crash, kill, protocol hangup).
    /// All page state is forfeit; only `relaunch` recovers.
    #[error("browser connection lost: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("proxy reconfiguration failed: {0}")]
    Proxy(String),
}
