//! # Leakhound Driver
//!
//! Contracts for the two external processes the detector drives: the
//! browser (navigation, in-page evaluation, heap snapshot acquisition,
//! relaunch) and the interception proxy sitting between the browser and
//! the application under test (JS rewriting, config injection).
//!
//! This crate deliberately contains no backend. Concrete drivers (CDP,
//! WebDriver, a test double) live with their hosts; the detector only ever
//! sees the traits below.
//!
//! ## Resource model
//!
//! A [`Driver`] is an exclusive resource: the detector issues at most one
//! outstanding evaluation or snapshot at a time, which is why the methods
//! take `&mut self`. The proxy is shared state reconfigured only between
//! workload phases, never during one.

use async_trait::async_trait;
use std::sync::Arc;

mod error;

pub use error::{DriverError, Result};

/// Settings pushed onto the interception proxy between phases.
///
/// `configure` is idempotent and takes effect on the next HTTP response
/// the proxy serves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    /// Rewrite application JavaScript so that property writes along
    /// instrumented paths record stack traces.
    pub rewrite_js: bool,
    /// Active fix set: rewrites neutralizing these leak ids are applied.
    pub fixes: Vec<u32>,
    /// Snippet injected into every HTML response before the first
    /// `<script>`, publishing `window.BLeakConfig`.
    pub inject_preamble: String,
    /// Kill-switch: ignore `rewrite_js` and `fixes` for instrumentation
    /// purposes while still injecting the preamble. Used for the base case
    /// of fix evaluation.
    pub disable_all_rewrites: bool,
    /// Forward the config's own `rewrite` hook to the proxy for arbitrary
    /// content rewriting. The hook body lives in the injected config
    /// source; this flag tells the proxy to evaluate and apply it.
    pub use_config_rewrite: bool,
}

/// The proxy between the browser and the application under test.
#[async_trait]
pub trait InterceptionProxy: Send + Sync {
    /// Install new settings. Replaces the previous configuration wholesale.
    async fn configure(&self, settings: ProxySettings) -> Result<()>;
}

/// A lazily parsed heap snapshot byte stream.
///
/// The producer hands the stream over immediately; parsing happens as the
/// consumer pulls chunks. Each snapshot is consumed exactly once.
#[async_trait]
pub trait HeapSnapshotStream: Send {
    /// Pull the next chunk, or `None` once the snapshot is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Handle on a running browser.
#[async_trait]
pub trait Driver: Send {
    /// Load `url`, resolving once the page has loaded.
    async fn navigate_to(&mut self, url: &str) -> Result<()>;

    /// Evaluate `source` in page context. The result must be
    /// JSON-serializable; page exceptions surface as [`DriverError::Eval`].
    async fn run_code(&mut self, source: &str) -> Result<serde_json::Value>;

    /// Begin a heap snapshot and return its lazy byte stream.
    async fn take_heap_snapshot(&mut self) -> Result<Box<dyn HeapSnapshotStream>>;

    /// Kill the browser and start a fresh one behind the same proxy.
    /// All prior page state is forfeit.
    async fn relaunch(&mut self) -> Result<()>;

    /// Tear the browser down for good.
    async fn shutdown(&mut self) -> Result<()>;

    /// The interception proxy this browser is wired through.
    fn proxy(&self) -> Arc<dyn InterceptionProxy>;
}
