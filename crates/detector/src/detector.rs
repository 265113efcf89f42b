//! The detection, diagnosis, and fix-evaluation controllers.

use crate::error::{DetectorError, Result};
use crate::growth::{GrowthTracker, HeapGraphBuilder};
use crate::proxy_setup::configure_proxy;
use crate::report::CsvReporter;
use crate::resolve::{IdentityResolver, StackFrameResolver};
use crate::results::Results;
use crate::workload::{SnapshotSink, Workload};
use async_trait::async_trait;
use leakhound_config::{shim, AppConfig, Phase};
use leakhound_driver::{Driver, HeapSnapshotStream};
use leakhound_protocol::{to_path_tree, GrowthStacks, LeakRoot};
use log::{info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

const LEAKS_FILE: &str = "leaks.json";
const PATHS_FILE: &str = "paths.json";

/// Where to restart an interrupted fix evaluation.
///
/// All `(metric, leaksFixed)` pairs before `metric` are skipped, and the
/// inner loop starts at `leaks_fixed`. The CSV header is treated as
/// already written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub leaks_fixed: usize,
    pub metric: String,
}

/// User hook invoked with every snapshot taken during fix evaluation,
/// after the CSV row for it has been recorded.
///
/// By that point the snapshot stream has already been drained by the
/// heap-graph builder. Failures are logged and never abort the run.
#[async_trait]
pub trait SnapshotCallback: Send {
    async fn on_snapshot(
        &mut self,
        metric: &str,
        leaks_fixed: usize,
        iteration: u32,
        snapshot: &mut dyn HeapSnapshotStream,
    ) -> anyhow::Result<()>;
}

/// Detector lifecycle. The detection flow walks `Constructed →
/// FindingPaths → Diagnosing → Done`; the evaluation flow walks
/// `Constructed → EvaluatingFixes → Done`. One instance runs one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Constructed,
    FindingPaths,
    Diagnosing,
    EvaluatingFixes,
    Done,
}

/// Collaborators and output locations for a [`LeakDetector`].
pub struct DetectorOptions {
    pub growth_tracker: Box<dyn GrowthTracker>,
    pub heap_graph: Box<dyn HeapGraphBuilder>,
    pub resolver: Box<dyn StackFrameResolver>,
    /// Directory receiving `leaks.json` / `paths.json`.
    pub artifact_dir: PathBuf,
}

impl DetectorOptions {
    pub fn new(
        growth_tracker: Box<dyn GrowthTracker>,
        heap_graph: Box<dyn HeapGraphBuilder>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            growth_tracker,
            heap_graph,
            resolver: Box::new(IdentityResolver),
            artifact_dir: artifact_dir.into(),
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn StackFrameResolver>) -> Self {
        self.resolver = resolver;
        self
    }
}

/// Finds memory leaks in a client-side web application by replaying a
/// scripted workload and watching the heap, then attributes growth to
/// source locations by instrumenting the leaking paths.
pub struct LeakDetector {
    driver: Box<dyn Driver>,
    config: AppConfig,
    config_source: String,
    tracker: Box<dyn GrowthTracker>,
    heap_graph: Box<dyn HeapGraphBuilder>,
    resolver: Box<dyn StackFrameResolver>,
    artifact_dir: PathBuf,
    state: Lifecycle,
    leak_roots: Vec<LeakRoot>,
}

impl LeakDetector {
    /// Materialize the configuration and build a detector around a live
    /// driver.
    ///
    /// The config source is evaluated once, through the driver, under the
    /// module-emulation shim; only its JSON projection crosses back.
    pub async fn new(
        mut driver: Box<dyn Driver>,
        config_source: &str,
        options: DetectorOptions,
    ) -> Result<Self> {
        let projection = driver
            .run_code(&shim::projection_script(config_source))
            .await
            .map_err(|err| DetectorError::PageEval {
                context: "config projection".to_string(),
                source: err,
            })?;
        let config = AppConfig::from_projection(projection)?;
        info!(
            "detector ready for `{}` at {} ({} loop steps, {} iterations)",
            config.name,
            config.url,
            config.loop_steps.len(),
            config.iterations
        );
        Ok(Self {
            driver,
            config,
            config_source: config_source.to_string(),
            tracker: options.growth_tracker,
            heap_graph: options.heap_graph,
            resolver: options.resolver,
            artifact_dir: options.artifact_dir,
            state: Lifecycle::Constructed,
            leak_roots: Vec::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Leak roots found by the last [`find_leak_paths`](Self::find_leak_paths).
    pub fn leak_roots(&self) -> &[LeakRoot] {
        &self.leak_roots
    }

    fn transition(&mut self, from: Lifecycle, to: Lifecycle, op: &str) -> Result<()> {
        if self.state != from {
            return Err(DetectorError::InvalidState(format!(
                "{op} requires the {from:?} state, but the detector is {:?}",
                self.state
            )));
        }
        self.state = to;
        Ok(())
    }

    async fn run_page(&mut self, source: &str, context: &str) -> Result<Value> {
        self.driver
            .run_code(source)
            .await
            .map_err(|err| DetectorError::PageEval {
                context: context.to_string(),
                source: err,
            })
    }

    /// Run the uninstrumented workload and identify heap-graph paths whose
    /// reachable object counts grow across every iteration.
    ///
    /// Leak rewrites listed in `fixedLeaks` stay active so already-fixed
    /// leaks do not resurface; JS instrumentation stays off so the heap is
    /// undisturbed. The returned roots are also cached on the detector for
    /// the diagnosis pass.
    pub async fn find_leak_paths(&mut self) -> Result<Vec<LeakRoot>> {
        self.transition(
            Lifecycle::Constructed,
            Lifecycle::FindingPaths,
            "find_leak_paths",
        )?;

        configure_proxy(
            self.driver.proxy().as_ref(),
            &self.config_source,
            false,
            self.config.fixed_leaks.clone(),
            false,
            true,
        )
        .await?;

        {
            let mut sink = TrackerSink {
                tracker: self.tracker.as_mut(),
            };
            let mut workload = Workload {
                driver: self.driver.as_mut(),
                config: &self.config,
            };
            workload
                .execute(self.config.iterations, true, Some(&mut sink), 1, false)
                .await?;
        }

        let roots = self.tracker.find_leak_paths().await?;
        let roots: Vec<LeakRoot> = roots
            .into_iter()
            .filter(|root| {
                if root.paths.is_empty() {
                    warn!("dropping leak root {} with no heap-graph path", root.id);
                    false
                } else {
                    true
                }
            })
            .collect();
        info!("found {} growing leak roots", roots.len());
        self.leak_roots = roots.clone();
        Ok(roots)
    }

    /// Rerun the workload with JS rewriting on, instrument the given leak
    /// roots in the page, and harvest the stack traces recorded at each
    /// growth site.
    pub async fn diagnose_leaks(&mut self, leak_roots: Vec<LeakRoot>) -> Result<Results> {
        self.transition(
            Lifecycle::FindingPaths,
            Lifecycle::Diagnosing,
            "diagnose_leaks",
        )?;

        let mut results = Results::new(leak_roots.clone());
        let tree = to_path_tree(&leak_roots);
        let tree_pretty = serde_json::to_vec_pretty(&tree)?;

        tokio::fs::create_dir_all(&self.artifact_dir).await?;
        tokio::fs::write(self.artifact_dir.join(LEAKS_FILE), &tree_pretty).await?;
        if !leak_roots.is_empty() {
            tokio::fs::write(self.artifact_dir.join(PATHS_FILE), &tree_pretty).await?;
        }

        if leak_roots.is_empty() {
            info!("no leak roots to diagnose");
            self.state = Lifecycle::Done;
            return Ok(results.compact());
        }

        configure_proxy(
            self.driver.proxy().as_ref(),
            &self.config_source,
            true,
            self.config.fixed_leaks.clone(),
            false,
            true,
        )
        .await?;

        // Warm the rewritten page with one plain iteration.
        {
            let mut workload = Workload {
                driver: self.driver.as_mut(),
                config: &self.config,
            };
            workload.execute(1, false, None, 1, false).await?;
        }

        let tree_arg = serde_json::to_string(&tree)?;
        self.run_page(
            &format!("window.$$$INSTRUMENT_PATHS$$$({tree_arg})"),
            "instrument paths",
        )
        .await?;

        // Two instrumented loops to accumulate stacks at the write sites.
        {
            let mut workload = Workload {
                driver: self.driver.as_mut(),
                config: &self.config,
            };
            workload.run_loop(Phase::Loop, true, false).await?;
            workload.run_loop(Phase::Loop, true, false).await?;
        }

        let raw = self
            .run_page("window.$$$GET_STACK_TRACES$$$()", "collect stack traces")
            .await?;
        let growth_stacks: GrowthStacks = serde_json::from_value(raw)?;

        for root in &leak_roots {
            // Roots the page recorded nothing for keep an empty stack set.
            let raw_traces = growth_stacks.get(&root.id.0).cloned().unwrap_or_default();
            for raw_trace in &raw_traces {
                let resolved = self.resolver.resolve(raw_trace).await;
                results.add_stack(root.id, resolved);
            }
        }

        self.state = Lifecycle::Done;
        Ok(results.compact())
    }

    /// The full detection flow: find growing paths, then diagnose them.
    pub async fn find_and_diagnose_leaks(&mut self) -> Result<Results> {
        self.find_leak_paths().await?;
        let roots = self.leak_roots.clone();
        self.diagnose_leaks(roots).await
    }

    /// Replay the workload under every prefix of every metric's fix list,
    /// reporting one CSV row per snapshot through `log`.
    ///
    /// The outer loop follows the config's metric order; the inner loop
    /// grows the fix prefix from 0 to the full list. Each pair replays
    /// under a crash-resilient wrapper: on failure the pair's buffered
    /// rows are discarded, the browser is relaunched, and the pair retries
    /// until it completes, so every reported row belongs to a complete
    /// successful replay. The driver is shut down at the end.
    pub async fn evaluate_leak_fixes(
        &mut self,
        iterations: u32,
        iterations_per_snapshot: u32,
        mut log: impl FnMut(&str) + Send,
        mut snapshot_cb: Option<&mut dyn SnapshotCallback>,
        resume_at: Option<ResumePoint>,
    ) -> Result<()> {
        self.transition(
            Lifecycle::Constructed,
            Lifecycle::EvaluatingFixes,
            "evaluate_leak_fixes",
        )?;

        let mut reporter = CsvReporter::new(resume_at.is_some());
        let mut resume = resume_at;
        let leaks = self.config.leaks.clone();
        let mut first_pair = true;

        for (metric, leak_ids) in &leaks {
            let mut start = 0;
            if let Some(point) = &resume {
                if &point.metric != metric {
                    continue;
                }
                start = point.leaks_fixed;
                resume = None;
            }

            for leaks_fixed in start..=leak_ids.len() {
                if !first_pair {
                    self.driver.relaunch().await?;
                }
                first_pair = false;

                configure_proxy(
                    self.driver.proxy().as_ref(),
                    &self.config_source,
                    false,
                    leak_ids[..leaks_fixed].to_vec(),
                    true,
                    true,
                )
                .await?;

                info!("evaluating metric `{metric}` with {leaks_fixed} fixes applied");
                loop {
                    reporter.begin_attempt();
                    let attempt = {
                        let mut sink = EvalSink {
                            reporter: &mut reporter,
                            heap_graph: self.heap_graph.as_ref(),
                            callback: snapshot_cb.take(),
                            metric: metric.as_str(),
                            leaks_fixed,
                            iteration: 0,
                        };
                        let mut workload = Workload {
                            driver: self.driver.as_mut(),
                            config: &self.config,
                        };
                        let result = workload
                            .execute(
                                iterations,
                                true,
                                Some(&mut sink),
                                iterations_per_snapshot,
                                true,
                            )
                            .await;
                        snapshot_cb = sink.callback.take();
                        result
                    };
                    match attempt {
                        Ok(()) => {
                            reporter.commit(&mut log);
                            break;
                        }
                        Err(err) => {
                            warn!(
                                "replay of metric `{metric}` with {leaks_fixed} fixes failed, \
                                 relaunching browser and retrying: {err}"
                            );
                            reporter.abort();
                            self.driver.relaunch().await?;
                        }
                    }
                }
            }
        }

        self.driver.shutdown().await?;
        self.state = Lifecycle::Done;
        Ok(())
    }
}

/// Feeds find-leaks snapshots into the growth tracker.
struct TrackerSink<'a> {
    tracker: &'a mut dyn GrowthTracker,
}

#[async_trait]
impl SnapshotSink for TrackerSink<'_> {
    async fn accept(&mut self, snapshot: Box<dyn HeapSnapshotStream>) -> anyhow::Result<()> {
        self.tracker.add_snapshot(snapshot).await?;
        Ok(())
    }
}

/// Sizes each fix-evaluation snapshot into a buffered CSV row, then hands
/// the drained snapshot to the user callback.
struct EvalSink<'r, 'h, 'c, 'm> {
    reporter: &'r mut CsvReporter,
    heap_graph: &'h dyn HeapGraphBuilder,
    callback: Option<&'c mut dyn SnapshotCallback>,
    metric: &'m str,
    leaks_fixed: usize,
    iteration: u32,
}

#[async_trait]
impl SnapshotSink for EvalSink<'_, '_, '_, '_> {
    async fn accept(&mut self, mut snapshot: Box<dyn HeapSnapshotStream>) -> anyhow::Result<()> {
        let metrics = self.heap_graph.calculate_size(snapshot.as_mut()).await?;

        let mut row: BTreeMap<String, Value> = match serde_json::to_value(metrics)? {
            Value::Object(map) => map.into_iter().collect(),
            other => anyhow::bail!("heap metrics serialized to non-object value: {other}"),
        };
        row.insert("metric".to_string(), Value::from(self.metric));
        row.insert("leaksFixed".to_string(), Value::from(self.leaks_fixed as u64));
        row.insert(
            "iterationCount".to_string(),
            Value::from(u64::from(self.iteration)),
        );
        self.reporter.push_row(&row)?;

        if let Some(cb) = self.callback.as_mut() {
            if let Err(err) = cb
                .on_snapshot(self.metric, self.leaks_fixed, self.iteration, snapshot.as_mut())
                .await
            {
                warn!("snapshot callback failed: {err:#}");
            }
        }
        self.iteration += 1;
        Ok(())
    }
}
