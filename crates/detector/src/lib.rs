//! # Leakhound Detector
//!
//! Orchestrates automatic memory-leak detection for client-side web apps.
//!
//! ## Pipeline
//!
//! ```text
//! Config source (JS)
//!     │
//!     ├──> Proxy configurator (injection preamble, rewrites, fixes)
//!     │
//!     └──> Execution orchestrator
//!            ├──> Step engine (poll in-page check(), fire next())
//!            ├──> Loop runner (phase sequencing, loop boundaries)
//!            └──> Heap snapshots
//!                   ├──> Growth tracker ──> leak roots
//!                   ├──> Heap graph ──> CSV metrics
//!                   └──> In-page instrumentation ──> stack traces
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use leakhound_detector::{DetectorOptions, LeakDetector};
//!
//! # async fn run(
//! #     driver: Box<dyn leakhound_driver::Driver>,
//! #     tracker: Box<dyn leakhound_detector::GrowthTracker>,
//! #     heap_graph: Box<dyn leakhound_detector::HeapGraphBuilder>,
//! # ) -> anyhow::Result<()> {
//! let source = std::fs::read_to_string("config.js")?;
//! let options = DetectorOptions::new(tracker, heap_graph, "out");
//! let mut detector = LeakDetector::new(driver, &source, options).await?;
//! let results = detector.find_and_diagnose_leaks().await?;
//! for leak in results.leaks() {
//!     println!("leak {} via {:?}", leak.id, leak.paths[0]);
//! }
//! # Ok(())
//! # }
//! ```

mod detector;
mod error;
mod growth;
mod proxy_setup;
mod report;
mod resolve;
mod results;
pub mod steps;
mod workload;

pub use detector::{DetectorOptions, LeakDetector, ResumePoint, SnapshotCallback};
pub use error::{DetectorError, Result};
pub use growth::{GrowthError, GrowthTracker, HeapGraphBuilder};
pub use resolve::{IdentityResolver, StackFrameResolver};
pub use results::Results;
pub use workload::SnapshotSink;
