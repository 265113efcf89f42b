//! # Leakhound Protocol
//!
//! Shared data model for the leak detection pipeline: leak roots, heap-graph
//! paths, the compact path tree exchanged with the in-page instrumentation
//! agent, stack traces, and the heap metrics record reported during fix
//! evaluation.
//!
//! Everything here is plain serde data. The traits that move these values
//! around (browser driver, growth tracker, resolver) live in the `driver`
//! and `detector` crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod path_tree;

pub use path_tree::{paths_of, to_path_tree, PathTreeNode};

/// Dense identifier assigned to a leak root by the growth tracker.
///
/// Ids are stable for the lifetime of a detection run: the id handed out by
/// `find_leak_paths` is the key under which the page-side agent buckets
/// stack traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeakId(pub u32);

impl std::fmt::Display for LeakId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A heap-graph path from a GC root to an object, as a sequence of edge
/// names (property names, index edges rendered as decimal strings).
pub type HeapPath = Vec<String>;

/// A single stack frame as emitted by the page, before source-map
/// resolution: script URL plus 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawStackFrame {
    pub url: String,
    pub line: u32,
    pub col: u32,
}

/// A stack frame after source-map resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub col: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub type RawStackTrace = Vec<RawStackFrame>;
pub type StackTrace = Vec<StackFrame>;

/// Raw stacks harvested from the page, keyed by leak root id.
///
/// This is exactly the shape returned by `window.$$$GET_STACK_TRACES$$$()`;
/// keys are the decimal `LeakId` values.
pub type GrowthStacks = HashMap<u32, Vec<RawStackTrace>>;

/// A heap object whose reachable-object count grew monotonically across
/// every observed loop iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakRoot {
    pub id: LeakId,
    /// Heap-graph paths reaching this root. Never empty for an emitted root.
    pub paths: Vec<HeapPath>,
    /// Stack traces attributed to growth at this root during diagnosis.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacks: Vec<StackTrace>,
}

impl LeakRoot {
    pub fn new(id: LeakId, paths: Vec<HeapPath>) -> Self {
        Self {
            id,
            paths,
            stacks: Vec::new(),
        }
    }
}

/// Size summary of one heap snapshot, as computed by the heap-graph
/// collaborator's `calculate_size`.
///
/// Field names serialize in camelCase; the CSV reporter derives its column
/// set from this record, so adding a field here widens every report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapMetrics {
    pub num_nodes: u64,
    pub num_edges: u64,
    pub total_size: u64,
    pub object_size: u64,
    pub array_size: u64,
    pub string_size: u64,
    pub code_size: u64,
    pub closure_size: u64,
    pub native_size: u64,
    pub unknown_size: u64,
}
