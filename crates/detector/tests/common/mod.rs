//! Shared test doubles: a scriptable browser driver, a recording proxy,
//! and canned heap-analysis collaborators.
#![allow(dead_code)]

use async_trait::async_trait;
use leakhound_detector::{
    GrowthError, GrowthTracker, HeapGraphBuilder, SnapshotCallback, StackFrameResolver,
};
use leakhound_driver::{
    Driver, DriverError, HeapSnapshotStream, InterceptionProxy, ProxySettings,
    Result as DriverResult,
};
use leakhound_protocol::{HeapMetrics, LeakRoot, RawStackFrame, StackFrame, StackTrace};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Arbitrary workload config source. The mock driver answers the
/// projection script directly, so only the projection value matters.
pub const CONFIG_SOURCE: &str = r#"
exports.url = "http://localhost:8080/";
exports.loop = [
  { check: function() { return document.readyState === "complete"; },
    next: function() { document.getElementById("go").click(); } }
];
"#;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Navigate(String),
    Check(String, usize),
    Next(String, usize),
    Snapshot(u32),
    Instrument(Value),
    GetStacks,
    Relaunch,
    Shutdown,
}

pub struct MockState {
    pub events: Vec<Event>,
    /// Steps whose `check()` never turns true.
    pub never_ready: Vec<(String, usize)>,
    /// Simulate blocked config injection: the probe sees no `BLeakConfig`.
    pub config_missing: bool,
    /// The first N `check()` evaluations raise.
    pub check_throws: u32,
    /// One-shot: the first `next()` evaluation fails with a lost
    /// connection.
    pub fail_first_next: bool,
    /// Payload served for `$$$GET_STACK_TRACES$$$()`.
    pub stack_traces: Value,
    snapshot_seq: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            never_ready: Vec::new(),
            config_missing: false,
            check_throws: 0,
            fail_first_next: false,
            stack_traces: json!({}),
            snapshot_seq: 0,
        }
    }
}

impl MockState {
    pub fn count<F: Fn(&Event) -> bool>(&self, pred: F) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

#[derive(Default)]
pub struct MockProxy {
    pub configurations: Mutex<Vec<ProxySettings>>,
}

#[async_trait]
impl InterceptionProxy for MockProxy {
    async fn configure(&self, settings: ProxySettings) -> DriverResult<()> {
        self.configurations.lock().unwrap().push(settings);
        Ok(())
    }
}

struct MockSnapshot {
    chunk: Option<Vec<u8>>,
}

#[async_trait]
impl HeapSnapshotStream for MockSnapshot {
    async fn next_chunk(&mut self) -> DriverResult<Option<Vec<u8>>> {
        Ok(self.chunk.take())
    }
}

pub struct MockDriver {
    projection: Value,
    state: Arc<Mutex<MockState>>,
    proxy: Arc<MockProxy>,
}

/// Handles the test keeps after giving the boxed driver away.
pub struct Harness {
    pub state: Arc<Mutex<MockState>>,
    pub proxy: Arc<MockProxy>,
}

pub fn driver(projection: Value) -> (Box<dyn Driver>, Harness) {
    let state = Arc::new(Mutex::new(MockState::default()));
    let proxy = Arc::new(MockProxy::default());
    let driver = MockDriver {
        projection,
        state: state.clone(),
        proxy: proxy.clone(),
    };
    (Box::new(driver), Harness { state, proxy })
}

fn parse_target(source: &str) -> (String, usize) {
    let rest = source
        .split("BLeakConfig.")
        .nth(1)
        .expect("step script references BLeakConfig");
    let open = rest.find('[').expect("step script indexes a phase");
    let close = rest.find(']').expect("step script closes the index");
    let phase = rest[..open].to_string();
    let index = rest[open + 1..close].parse().expect("numeric step index");
    (phase, index)
}

#[async_trait]
impl Driver for MockDriver {
    async fn navigate_to(&mut self, url: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Navigate(url.to_string()));
        Ok(())
    }

    async fn run_code(&mut self, source: &str) -> DriverResult<Value> {
        if source.contains("stepMeta") {
            return Ok(self.projection.clone());
        }
        if source.contains("$$$INSTRUMENT_PATHS$$$") {
            let open = source.find('(').unwrap();
            let close = source.rfind(')').unwrap();
            let tree: Value = serde_json::from_str(&source[open + 1..close])
                .map_err(|e| DriverError::Eval(e.to_string()))?;
            self.state.lock().unwrap().events.push(Event::Instrument(tree));
            return Ok(Value::Null);
        }
        if source.contains("$$$GET_STACK_TRACES$$$") {
            let mut state = self.state.lock().unwrap();
            state.events.push(Event::GetStacks);
            return Ok(state.stack_traces.clone());
        }
        if source.contains(".check()") {
            let (phase, index) = parse_target(source);
            let mut state = self.state.lock().unwrap();
            state.events.push(Event::Check(phase.clone(), index));
            if state.config_missing {
                return Ok(json!("missing"));
            }
            if state.check_throws > 0 {
                state.check_throws -= 1;
                return Err(DriverError::Eval("check() raised TypeError".to_string()));
            }
            if state.never_ready.iter().any(|(p, i)| *p == phase && *i == index) {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(true));
        }
        if source.contains(".next()") {
            let (phase, index) = parse_target(source);
            let mut state = self.state.lock().unwrap();
            state.events.push(Event::Next(phase, index));
            if state.fail_first_next {
                state.fail_first_next = false;
                return Err(DriverError::Connection("browser died".to_string()));
            }
            return Ok(Value::Bool(true));
        }
        Err(DriverError::Protocol(format!("unexpected script: {source}")))
    }

    async fn take_heap_snapshot(&mut self) -> DriverResult<Box<dyn HeapSnapshotStream>> {
        let mut state = self.state.lock().unwrap();
        state.snapshot_seq += 1;
        let seq = state.snapshot_seq;
        state.events.push(Event::Snapshot(seq));
        Ok(Box::new(MockSnapshot {
            chunk: Some(vec![seq as u8]),
        }))
    }

    async fn relaunch(&mut self) -> DriverResult<()> {
        self.state.lock().unwrap().events.push(Event::Relaunch);
        Ok(())
    }

    async fn shutdown(&mut self) -> DriverResult<()> {
        self.state.lock().unwrap().events.push(Event::Shutdown);
        Ok(())
    }

    fn proxy(&self) -> Arc<dyn InterceptionProxy> {
        self.proxy.clone()
    }
}

/// Build a projection value like the one the shim's projection script
/// returns from the page.
pub struct ProjectionBuilder {
    url: String,
    iterations: u32,
    timeout: u64,
    login_steps: usize,
    loop_steps: usize,
    fixed_leaks: Vec<u32>,
    leaks: Vec<(String, Vec<u32>)>,
}

impl ProjectionBuilder {
    pub fn new() -> Self {
        Self {
            url: "http://localhost:8080/".to_string(),
            iterations: 2,
            timeout: 30_000,
            login_steps: 0,
            loop_steps: 1,
            fixed_leaks: Vec::new(),
            leaks: Vec::new(),
        }
    }

    pub fn iterations(mut self, n: u32) -> Self {
        self.iterations = n;
        self
    }

    pub fn timeout(mut self, ms: u64) -> Self {
        self.timeout = ms;
        self
    }

    pub fn login_steps(mut self, n: usize) -> Self {
        self.login_steps = n;
        self
    }

    pub fn loop_steps(mut self, n: usize) -> Self {
        self.loop_steps = n;
        self
    }

    pub fn fixed_leaks(mut self, ids: &[u32]) -> Self {
        self.fixed_leaks = ids.to_vec();
        self
    }

    pub fn leaks(mut self, metric: &str, ids: &[u32]) -> Self {
        self.leaks.push((metric.to_string(), ids.to_vec()));
        self
    }

    pub fn build(self) -> Value {
        let steps = |n: usize| -> Value { json!(vec![json!({ "sleep": null }); n]) };
        let leak_names: Vec<&str> = self.leaks.iter().map(|(m, _)| m.as_str()).collect();
        let leak_map: serde_json::Map<String, Value> = self
            .leaks
            .iter()
            .map(|(m, ids)| (m.clone(), json!(ids)))
            .collect();
        json!({
            "name": "test-app",
            "url": self.url,
            "iterations": self.iterations,
            "timeout": self.timeout,
            "fixedLeaks": self.fixed_leaks,
            "blackBox": [],
            "leakNames": leak_names,
            "leaks": leak_map,
            "login": steps(self.login_steps),
            "setup": steps(0),
            "loop": steps(self.loop_steps),
            "hasRewrite": false,
        })
    }
}

/// Growth tracker that drains every snapshot and replies with a canned
/// root set once it has seen at least two.
pub struct ScriptedTracker {
    pub roots: Vec<LeakRoot>,
    pub snapshots_seen: Arc<Mutex<usize>>,
}

impl ScriptedTracker {
    pub fn new(roots: Vec<LeakRoot>) -> (Self, Arc<Mutex<usize>>) {
        let seen = Arc::new(Mutex::new(0));
        (
            Self {
                roots,
                snapshots_seen: seen.clone(),
            },
            seen,
        )
    }
}

#[async_trait]
impl GrowthTracker for ScriptedTracker {
    async fn add_snapshot(
        &mut self,
        mut snapshot: Box<dyn HeapSnapshotStream>,
    ) -> Result<(), GrowthError> {
        loop {
            let chunk = snapshot
                .next_chunk()
                .await
                .map_err(|e| GrowthError::Snapshot(e.to_string()))?;
            if chunk.is_none() {
                break;
            }
        }
        *self.snapshots_seen.lock().unwrap() += 1;
        Ok(())
    }

    async fn find_leak_paths(&mut self) -> Result<Vec<LeakRoot>, GrowthError> {
        let seen = *self.snapshots_seen.lock().unwrap();
        if seen < 2 {
            return Err(GrowthError::InsufficientSnapshots(seen));
        }
        Ok(self.roots.clone())
    }
}

/// Heap-graph double with a fixed size summary.
pub struct FixedHeapGraph;

#[async_trait]
impl HeapGraphBuilder for FixedHeapGraph {
    async fn calculate_size(
        &self,
        snapshot: &mut dyn HeapSnapshotStream,
    ) -> Result<HeapMetrics, GrowthError> {
        loop {
            let chunk = snapshot
                .next_chunk()
                .await
                .map_err(|e| GrowthError::Snapshot(e.to_string()))?;
            if chunk.is_none() {
                break;
            }
        }
        Ok(HeapMetrics {
            num_nodes: 100,
            num_edges: 240,
            total_size: 4096,
            object_size: 2048,
            array_size: 512,
            string_size: 512,
            code_size: 256,
            closure_size: 256,
            native_size: 256,
            unknown_size: 256,
        })
    }
}

/// Resolver double that pretends every frame has a source-map entry:
/// bundle URLs map to `src/` files, lines shift to 0-based, and a frame
/// name appears.
pub struct SourceMappedResolver;

#[async_trait]
impl StackFrameResolver for SourceMappedResolver {
    async fn resolve(&self, raw: &[RawStackFrame]) -> StackTrace {
        raw.iter()
            .map(|frame| StackFrame {
                file: format!("src/{}", frame.url.trim_start_matches("http://app/")),
                line: frame.line.saturating_sub(1),
                col: frame.col,
                name: Some("handler".to_string()),
            })
            .collect()
    }
}

/// Snapshot callback that records its invocations and optionally fails.
pub struct RecordingCallback {
    pub calls: Arc<Mutex<Vec<(String, usize, u32)>>>,
    pub fail: bool,
}

impl RecordingCallback {
    pub fn new(fail: bool) -> (Self, Arc<Mutex<Vec<(String, usize, u32)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: calls.clone(),
                fail,
            },
            calls,
        )
    }
}

#[async_trait]
impl SnapshotCallback for RecordingCallback {
    async fn on_snapshot(
        &mut self,
        metric: &str,
        leaks_fixed: usize,
        iteration: u32,
        _snapshot: &mut dyn HeapSnapshotStream,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((metric.to_string(), leaks_fixed, iteration));
        if self.fail {
            anyhow::bail!("user callback exploded");
        }
        Ok(())
    }
}
