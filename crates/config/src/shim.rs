//! Module-emulation shim around the user's configuration source.
//!
//! A workload configuration is a JavaScript text blob written as a CommonJS
//! module: it assigns to `module.exports` (or mutates the pre-populated
//! default record). The controller never parses that JavaScript itself.
//! Instead it derives two scripts from the raw source:
//!
//! - the **injection preamble**, handed to the interception proxy so every
//!   HTML response publishes the evaluated config as `window.BLeakConfig`
//!   for the in-page step predicates and actions;
//! - the **projection script**, evaluated once through the browser driver
//!   to materialize the controller-side [`AppConfig`](crate::AppConfig)
//!   view. Only JSON-serializable metadata crosses that boundary; the
//!   `check`/`next` functions stay in the page.
//!
//! Both scripts give the source fresh `module`/`exports` bindings whose
//! `module.exports` starts as a deep copy of the defaults, built from a
//! fresh object literal on every evaluation.
//!
//! The configuration source is executed as trusted code, in the page and
//! (via the projection) in whatever context the driver evaluates in. Hosts
//! must not feed untrusted blobs through this shim.

use serde_json::json;

/// Loop iterations used by find-leaks when the config does not say.
pub const DEFAULT_ITERATIONS: u32 = 4;

/// Per-step wait cap when the config does not say: ten minutes.
pub const DEFAULT_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// The default configuration record, as a JSON object literal.
///
/// `login`/`setup`/`loop` default to empty phases, so a config only has to
/// spell out the phases it actually uses.
pub fn default_exports_json() -> String {
    json!({
        "name": "unknown",
        "iterations": DEFAULT_ITERATIONS,
        "url": "",
        "fixedLeaks": [],
        "leaks": {},
        "blackBox": [],
        "login": [],
        "setup": [],
        "loop": [],
        "timeout": DEFAULT_TIMEOUT_MS,
    })
    .to_string()
}

/// Build the snippet the proxy injects into every HTML response.
///
/// Evaluates the config source under the module shim and publishes the
/// resulting record as `window.BLeakConfig`.
pub fn injection_preamble(config_source: &str) -> String {
    let mut out = String::with_capacity(config_source.len() + 256);
    out.push_str("(function() {\n");
    out.push_str("var module = { exports: ");
    out.push_str(&default_exports_json());
    out.push_str(" };\n");
    out.push_str("var exports = module.exports;\n");
    out.push_str(config_source);
    out.push_str("\n;window.BLeakConfig = module.exports;\n");
    out.push_str("})();\n");
    out
}

/// Build the one-shot script that materializes the controller-side view.
///
/// The script is a single expression whose value is the JSON projection
/// consumed by [`AppConfig::from_projection`](crate::AppConfig::from_projection):
/// scalar fields, per-phase step metadata (sleep values only), and an
/// explicit `leakNames` list capturing the key iteration order of `leaks`.
pub fn projection_script(config_source: &str) -> String {
    let mut out = String::with_capacity(config_source.len() + 1024);
    out.push_str("(function() {\n");
    out.push_str("var module = { exports: ");
    out.push_str(&default_exports_json());
    out.push_str(" };\n");
    out.push_str("var exports = module.exports;\n");
    out.push_str(config_source);
    out.push_str(
        r#"
;var cfg = module.exports;
function stepMeta(steps) {
  steps = steps || [];
  var out = [];
  for (var i = 0; i < steps.length; i++) {
    var s = steps[i] && steps[i].sleep;
    out.push({ sleep: typeof s === "number" ? s : null });
  }
  return out;
}
var leaks = cfg.leaks || {};
var leakNames = [];
for (var k in leaks) {
  if (Object.prototype.hasOwnProperty.call(leaks, k)) {
    leakNames.push(k);
  }
}
return {
  name: cfg.name,
  url: cfg.url,
  iterations: cfg.iterations,
  timeout: cfg.timeout,
  fixedLeaks: cfg.fixedLeaks || [],
  blackBox: cfg.blackBox || [],
  leakNames: leakNames,
  leaks: leaks,
  login: stepMeta(cfg.login),
  setup: stepMeta(cfg.setup),
  loop: stepMeta(cfg.loop),
  hasRewrite: typeof cfg.rewrite === "function"
};
})()
"#,
    );
    out
}
