//! Prometheus metrics for the daemon core.
//!
//! Metrics live in a process-wide registry and are recorded through small
//! helper functions so call sites stay one line. Recording before [`init`]
//! is a silent no-op, which keeps unit tests free of setup.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Currently loaded modules.
pub static MODULES_LOADED: OnceLock<IntGauge> = OnceLock::new();

/// Module registrations rejected.
pub static MODULE_REJECTIONS: OnceLock<IntCounter> = OnceLock::new();

/// Action dispatches by semantic.
pub static ACTION_DISPATCHES: OnceLock<IntCounterVec> = OnceLock::new();

/// Applied mode changes by scope and letter.
pub static MODE_CHANGES: OnceLock<IntCounterVec> = OnceLock::new();

/// Link attempts rejected, by error code.
pub static LINK_REJECTIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Connected direct peers.
pub static PEERS_CONNECTED: OnceLock<IntGauge> = OnceLock::new();

/// Netsplits handled.
pub static NETSPLITS: OnceLock<IntCounter> = OnceLock::new();

/// Users removed because their server split off.
pub static NETSPLIT_USERS_PRUNED: OnceLock<IntCounter> = OnceLock::new();

/// Link records received, by kind.
pub static LINK_MESSAGES: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; only the first call registers anything.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(MODULES_LOADED, IntGauge::new("meshircd_modules_loaded", "Currently loaded modules"));
    register!(MODULE_REJECTIONS, IntCounter::new("meshircd_module_rejections_total", "Module registrations rejected"));
    register!(ACTION_DISPATCHES, IntCounterVec::new(Opts::new("meshircd_action_dispatch_total", "Action dispatches by semantic"), &["semantic"]));
    register!(MODE_CHANGES, IntCounterVec::new(Opts::new("meshircd_mode_changes_total", "Applied mode changes"), &["scope", "mode"]));
    register!(LINK_REJECTIONS, IntCounterVec::new(Opts::new("meshircd_link_rejections_total", "Server links rejected"), &["code"]));
    register!(PEERS_CONNECTED, IntGauge::new("meshircd_peers_connected", "Directly linked servers"));
    register!(NETSPLITS, IntCounter::new("meshircd_netsplits_total", "Netsplits handled"));
    register!(NETSPLIT_USERS_PRUNED, IntCounter::new("meshircd_netsplit_users_pruned_total", "Users removed by netsplits"));
    register!(LINK_MESSAGES, IntCounterVec::new(Opts::new("meshircd_link_messages_total", "Server link records received"), &["kind"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

#[inline]
pub fn set_modules_loaded(count: usize) {
    if let Some(g) = MODULES_LOADED.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn record_module_rejection() {
    if let Some(c) = MODULE_REJECTIONS.get() {
        c.inc();
    }
}

/// Record one dispatch call.
#[inline]
pub fn record_dispatch(semantic: &str) {
    if let Some(c) = ACTION_DISPATCHES.get() {
        c.with_label_values(&[semantic]).inc();
    }
}

/// Record an applied mode change.
#[inline]
pub fn record_mode_change(scope: &str, mode: char) {
    if let Some(c) = MODE_CHANGES.get() {
        c.with_label_values(&[scope, &mode.to_string()]).inc();
    }
}

#[inline]
pub fn record_link_rejection(code: &str) {
    if let Some(c) = LINK_REJECTIONS.get() {
        c.with_label_values(&[code]).inc();
    }
}

#[inline]
pub fn set_peers_connected(count: usize) {
    if let Some(g) = PEERS_CONNECTED.get() {
        g.set(count as i64);
    }
}

/// Record a handled netsplit and the users it removed.
#[inline]
pub fn record_netsplit(users_pruned: usize) {
    if let Some(c) = NETSPLITS.get() {
        c.inc();
    }
    if let Some(c) = NETSPLIT_USERS_PRUNED.get() {
        c.inc_by(users_pruned as u64);
    }
}

#[inline]
pub fn record_link_message(kind: &str) {
    if let Some(c) = LINK_MESSAGES.get() {
        c.with_label_values(&[kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();
        init();

        record_dispatch("voting");
        record_netsplit(3);

        let output = gather_metrics();
        assert!(output.contains("meshircd_action_dispatch_total"));
        assert!(output.contains("meshircd_netsplits_total"));
    }
}
