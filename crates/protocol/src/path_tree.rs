//! Compact projection of heap-graph paths.
//!
//! The page-side instrumentation agent takes the set of paths to instrument
//! as a prefix-merged tree rather than a flat path list, so that a shared
//! prefix such as `window.app.cache` is walked once. The tree shape is a
//! wire contract with the agent and must survive a serialize/deserialize
//! round trip unchanged.

use crate::{HeapPath, LeakId, LeakRoot};
use serde::{Deserialize, Serialize};

/// One node of the instrumentation path tree.
///
/// A node carries a leak root id when some root's path terminates at it;
/// interior nodes of longer paths leave `id` unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTreeNode {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<LeakId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PathTreeNode>,
}

impl PathTreeNode {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            id: None,
            children: Vec::new(),
        }
    }

    fn child_mut(&mut self, key: &str) -> &mut PathTreeNode {
        // Paths are short, so a linear scan beats a map here and keeps
        // first-seen ordering for the serialized form.
        let pos = self.children.iter().position(|c| c.key == key);
        match pos {
            Some(i) => &mut self.children[i],
            None => {
                self.children.push(PathTreeNode::new(key));
                self.children.last_mut().unwrap()
            }
        }
    }
}

/// Merge the paths of every leak root into a forest of prefix trees.
///
/// An empty root set projects to an empty forest (serialized as `[]`).
pub fn to_path_tree(roots: &[LeakRoot]) -> Vec<PathTreeNode> {
    // Synthetic unnamed root so insertion logic is uniform; its children
    // are the returned forest.
    let mut top = PathTreeNode::new("");
    for root in roots {
        for path in &root.paths {
            let mut node = &mut top;
            for segment in path {
                node = node.child_mut(segment);
            }
            if node.id.is_none() {
                node.id = Some(root.id);
            }
        }
    }
    top.children
}

/// Invert a path tree back into `(id, path)` pairs.
///
/// Every node carrying an id yields the path from a forest root down to it.
/// Pair order is a depth-first walk, which matches the insertion order used
/// by [`to_path_tree`].
pub fn paths_of(forest: &[PathTreeNode]) -> Vec<(LeakId, HeapPath)> {
    let mut out = Vec::new();
    let mut prefix = Vec::new();
    for node in forest {
        walk(node, &mut prefix, &mut out);
    }
    out
}

fn walk(node: &PathTreeNode, prefix: &mut Vec<String>, out: &mut Vec<(LeakId, HeapPath)>) {
    prefix.push(node.key.clone());
    if let Some(id) = node.id {
        out.push((id, prefix.clone()));
    }
    for child in &node.children {
        walk(child, prefix, out);
    }
    prefix.pop();
}
