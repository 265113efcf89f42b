//! Pushes the detector's per-phase settings onto the interception proxy.

use crate::error::Result;
use leakhound_config::shim;
use leakhound_driver::{InterceptionProxy, ProxySettings};
use log::debug;

/// Install rewriting and fix settings plus the config-injection preamble.
///
/// Idempotent (the proxy contract replaces settings wholesale); takes
/// effect on the next HTTP response, so this is only ever called between
/// phases, never during one.
pub(crate) async fn configure_proxy(
    proxy: &dyn InterceptionProxy,
    config_source: &str,
    rewrite_js: bool,
    fixes: Vec<u32>,
    disable_all_rewrites: bool,
    use_config_rewrite: bool,
) -> Result<()> {
    debug!(
        "configuring proxy: rewrite_js={rewrite_js} fixes={fixes:?} disable_all={disable_all_rewrites} config_rewrite={use_config_rewrite}"
    );
    let settings = ProxySettings {
        rewrite_js,
        fixes,
        inject_preamble: shim::injection_preamble(config_source),
        disable_all_rewrites,
        use_config_rewrite,
    };
    proxy.configure(settings).await?;
    Ok(())
}
