//! The step engine: advance the workload one declarative step.
//!
//! A step's `check` predicate and `next` action live in the page, so the
//! engine is robust to app-internal async work: it polls the predicate
//! through the driver until it turns true, then fires the action.

use crate::error::{DetectorError, Result};
use leakhound_config::{AppConfig, Phase};
use leakhound_driver::Driver;
use log::debug;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Predicate poll period.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause after a predicate turns true, so the following `next()` does not
/// race whatever mutation flipped it.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Sentinel returned by the probe when `BLeakConfig` is not defined.
const CONFIG_MISSING: &str = "missing";

fn check_script(phase: Phase, index: usize) -> String {
    format!(
        "(function() {{ if (typeof BLeakConfig === \"undefined\") {{ return \"{missing}\"; }} return !!BLeakConfig.{phase}[{index}].check(); }})()",
        missing = CONFIG_MISSING,
        phase = phase.as_str(),
        index = index,
    )
}

fn next_script(phase: Phase, index: usize) -> String {
    format!(
        "(function() {{ BLeakConfig.{phase}[{index}].next(); return true; }})()",
        phase = phase.as_str(),
        index = index,
    )
}

/// Wait until step `phase[index]` reports ready.
///
/// Honors the step's `sleep` first, then polls the page-side predicate
/// every [`POLL_INTERVAL`] until it returns true or `timeout` (the
/// config's step cap unless overridden) elapses. Predicate exceptions are
/// logged and swallowed; polling continues. If the config global was
/// absent on every poll the failure is reported as
/// [`DetectorError::ConfigNotInjected`] instead of a plain timeout.
pub async fn wait_until_true(
    driver: &mut dyn Driver,
    config: &AppConfig,
    phase: Phase,
    index: usize,
    timeout: Option<Duration>,
) -> Result<()> {
    let step = config.steps(phase).get(index).copied().unwrap_or_default();
    if let Some(ms) = step.sleep_ms {
        sleep(Duration::from_millis(ms)).await;
    }

    let timeout = timeout.unwrap_or_else(|| config.step_timeout());
    let deadline = Instant::now() + timeout;
    let script = check_script(phase, index);
    let mut config_seen = false;

    loop {
        match driver.run_code(&script).await {
            Ok(serde_json::Value::Bool(true)) => {
                sleep(SETTLE_DELAY).await;
                return Ok(());
            }
            Ok(value) => {
                if value.as_str() != Some(CONFIG_MISSING) {
                    config_seen = true;
                }
            }
            Err(err) => {
                // The probe only throws once BLeakConfig is defined, so an
                // exception still counts as a sighting.
                debug!("{phase}[{index}] check() raised, polling continues: {err}");
                config_seen = true;
            }
        }

        if Instant::now() >= deadline {
            if !config_seen {
                return Err(DetectorError::ConfigNotInjected { phase, step: index });
            }
            return Err(DetectorError::Timeout {
                phase,
                step: index,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Wait for step `phase[index]`, then run its `next()` action.
///
/// Unlike predicate exceptions, an exception out of `next()` is fatal to
/// the current phase and propagates.
pub async fn next_step(
    driver: &mut dyn Driver,
    config: &AppConfig,
    phase: Phase,
    index: usize,
) -> Result<()> {
    wait_until_true(driver, config, phase, index, None).await?;
    driver
        .run_code(&next_script(phase, index))
        .await
        .map_err(|err| DetectorError::PageEval {
            context: format!("{phase}[{index}].next()"),
            source: err,
        })?;
    Ok(())
}
