//! Stack-frame resolution contract.
//!
//! Raw frames come out of the page as script URL + generated line/column.
//! A resolver maps them back to original source positions, typically via
//! the proxy's source-map cache. Resolution is best-effort by contract: a
//! frame that cannot be mapped is passed through unchanged.

use async_trait::async_trait;
use leakhound_protocol::{RawStackFrame, StackFrame, StackTrace};

#[async_trait]
pub trait StackFrameResolver: Send + Sync {
    async fn resolve(&self, raw: &[RawStackFrame]) -> StackTrace;
}

/// Resolver used when no source maps are available: a 1:1 mapping from raw
/// frames to resolved frames.
pub struct IdentityResolver;

#[async_trait]
impl StackFrameResolver for IdentityResolver {
    async fn resolve(&self, raw: &[RawStackFrame]) -> StackTrace {
        raw.iter()
            .map(|frame| StackFrame {
                file: frame.url.clone(),
                line: frame.line,
                col: frame.col,
                name: None,
            })
            .collect()
    }
}
