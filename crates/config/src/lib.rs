//! # Leakhound Config
//!
//! The controller-side view of a workload configuration.
//!
//! A configuration arrives as executable JavaScript (see [`shim`]); the
//! controller materializes it into an [`AppConfig`] by evaluating the
//! projection script through the browser driver once, then consults the
//! resulting record for URLs, phase lengths, iteration counts, and the
//! ordered metric list. Step `check`/`next` bodies never leave the page.

use serde::Deserialize;
use std::time::Duration;

mod error;
pub mod shim;

pub use error::{ConfigError, Result};
pub use shim::{DEFAULT_ITERATIONS, DEFAULT_TIMEOUT_MS};

/// The three scripted phases of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Login,
    Setup,
    Loop,
}

impl Phase {
    /// The property name of this phase on the page-side `BLeakConfig`.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Login => "login",
            Phase::Setup => "setup",
            Phase::Loop => "loop",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller-visible metadata of one step. The `check` and `next`
/// functions are interpreted in the page, not here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepMeta {
    /// Optional pre-wait before the step's predicate is first polled.
    pub sleep_ms: Option<u64>,
}

/// Materialized workload configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub name: String,
    pub url: String,
    /// Loop iterations for the find-leaks pass.
    pub iterations: u32,
    /// Per-step wait cap.
    pub timeout_ms: u64,
    /// Leak ids whose rewrites are applied during find-leaks.
    pub fixed_leaks: Vec<u32>,
    /// Metric name to fix list, in config key order. The order defines the
    /// outer loop of fix evaluation and the metric column order of the CSV.
    pub leaks: Vec<(String, Vec<u32>)>,
    /// URL patterns excluded from JS rewriting.
    pub black_box: Vec<String>,
    pub login: Vec<StepMeta>,
    pub setup: Vec<StepMeta>,
    pub loop_steps: Vec<StepMeta>,
    /// Whether the config exports a `rewrite` function for the proxy.
    pub has_rewrite: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepWire {
    #[serde(default)]
    sleep: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionWire {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    iterations: Option<u32>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    fixed_leaks: Vec<u32>,
    #[serde(default)]
    black_box: Vec<String>,
    #[serde(default)]
    leak_names: Vec<String>,
    #[serde(default)]
    leaks: std::collections::HashMap<String, Vec<u32>>,
    #[serde(default)]
    login: Vec<StepWire>,
    #[serde(default)]
    setup: Vec<StepWire>,
    #[serde(default, rename = "loop")]
    loop_steps: Vec<StepWire>,
    #[serde(default)]
    has_rewrite: bool,
}

fn steps_from_wire(wire: Vec<StepWire>) -> Vec<StepMeta> {
    wire.into_iter()
        .map(|s| StepMeta { sleep_ms: s.sleep })
        .collect()
}

impl AppConfig {
    /// Build a config from the JSON projection returned by evaluating
    /// [`shim::projection_script`] through the driver.
    ///
    /// `leakNames` carries the key iteration order of the page-side `leaks`
    /// record; mappings in serde lose it, so the projection spells it out.
    pub fn from_projection(value: serde_json::Value) -> Result<Self> {
        let mut wire: ProjectionWire = serde_json::from_value(value)?;

        if wire.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "config must export a non-empty `url`".to_string(),
            ));
        }
        let iterations = wire.iterations.unwrap_or(DEFAULT_ITERATIONS);
        if iterations == 0 {
            return Err(ConfigError::Invalid(
                "`iterations` must be a positive integer".to_string(),
            ));
        }

        let mut leaks = Vec::with_capacity(wire.leak_names.len());
        for name in &wire.leak_names {
            let ids = wire.leaks.remove(name).ok_or_else(|| {
                ConfigError::Invalid(format!("leak metric `{name}` listed but not defined"))
            })?;
            leaks.push((name.clone(), ids));
        }

        Ok(Self {
            name: wire.name.unwrap_or_else(|| "unknown".to_string()),
            url: wire.url,
            iterations,
            timeout_ms: wire.timeout.unwrap_or(DEFAULT_TIMEOUT_MS),
            fixed_leaks: wire.fixed_leaks,
            leaks,
            black_box: wire.black_box,
            login: steps_from_wire(wire.login),
            setup: steps_from_wire(wire.setup),
            loop_steps: steps_from_wire(wire.loop_steps),
            has_rewrite: wire.has_rewrite,
        })
    }

    /// Step metadata for a phase.
    pub fn steps(&self, phase: Phase) -> &[StepMeta] {
        match phase {
            Phase::Login => &self.login,
            Phase::Setup => &self.setup,
            Phase::Loop => &self.loop_steps,
        }
    }

    /// The per-step wait cap as a [`Duration`].
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
