//! Aggregated outcome of a detection run.

use leakhound_protocol::{LeakId, LeakRoot, StackTrace};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Leak roots with their attributed stacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    leaks: Vec<LeakRoot>,
}

impl Results {
    pub fn new(leaks: Vec<LeakRoot>) -> Self {
        Self { leaks }
    }

    pub fn leaks(&self) -> &[LeakRoot] {
        &self.leaks
    }

    /// Attach a resolved stack trace to the leak root with this id.
    /// Returns false when the id is unknown (no attribution).
    pub fn add_stack(&mut self, id: LeakId, stack: StackTrace) -> bool {
        match self.leaks.iter_mut().find(|leak| leak.id == id) {
            Some(leak) => {
                leak.stacks.push(stack);
                true
            }
            None => false,
        }
    }

    /// Final normalization: roots ordered by id, duplicate stacks dropped
    /// (first occurrence wins). Applying it twice equals applying it once.
    pub fn compact(mut self) -> Self {
        self.leaks.sort_by_key(|leak| leak.id);
        for leak in &mut self.leaks {
            let mut seen: HashSet<StackTrace> = HashSet::new();
            leak.stacks.retain(|stack| seen.insert(stack.clone()));
        }
        self
    }
}
