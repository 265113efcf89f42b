//! Contracts for the heap-analysis collaborators.
//!
//! The detector never parses heap snapshots itself. Growth identification
//! and snapshot sizing are pluggable: production hosts wire in a real
//! heap-graph engine, tests wire in scripted doubles.

use async_trait::async_trait;
use leakhound_driver::HeapSnapshotStream;
use leakhound_protocol::{HeapMetrics, LeakRoot};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrowthError {
    /// `find_leak_paths` was called before enough snapshots were ingested.
    #[error("growth analysis requires at least 2 snapshots, got {0}")]
    InsufficientSnapshots(usize),

    #[error("snapshot ingestion failed: {0}")]
    Snapshot(String),

    #[error("{0}")]
    Other(String),
}

/// Tracks reachable-object growth across a series of heap snapshots.
///
/// Contract:
/// - snapshots arrive through [`add_snapshot`](GrowthTracker::add_snapshot)
///   in strict temporal order, each consumed exactly once;
/// - [`find_leak_paths`](GrowthTracker::find_leak_paths) may only be asked
///   after at least two snapshots, and yields roots whose reachable-object
///   counts grew monotonically across every observed snapshot, each with
///   at least one heap-graph path and a dense, stable id.
#[async_trait]
pub trait GrowthTracker: Send {
    async fn add_snapshot(
        &mut self,
        snapshot: Box<dyn HeapSnapshotStream>,
    ) -> std::result::Result<(), GrowthError>;

    async fn find_leak_paths(&mut self) -> std::result::Result<Vec<LeakRoot>, GrowthError>;
}

/// Builds a heap graph from one snapshot and sizes it.
///
/// This is the collaborator behind the fix-evaluation CSV: one
/// [`HeapMetrics`] record per snapshot.
#[async_trait]
pub trait HeapGraphBuilder: Send + Sync {
    async fn calculate_size(
        &self,
        snapshot: &mut dyn HeapSnapshotStream,
    ) -> std::result::Result<HeapMetrics, GrowthError>;
}
