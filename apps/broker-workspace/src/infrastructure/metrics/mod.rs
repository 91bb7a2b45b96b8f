//! Prometheus Metrics Module
//!
//! Records workspace metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Lookups**: Session lookups by stage and outcome
//! - **Subscriptions**: Per-security subscriptions by capability and outcome
//! - **Assembly**: Assembly runs and their duration
//! - **Workspace**: Number of live bindings
//! - **Scheduler**: Timers armed
//!
//! # Integration
//!
//! Metrics are rendered on demand by the shell's `metrics` command. Until
//! [`init_metrics`] installs a recorder every call here is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::error::{AssemblyError, Capability, Stage};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the already-installed handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "broker_workspace_lookups_total",
        "Session lookups by stage and outcome"
    );
    describe_counter!(
        "broker_workspace_subscriptions_total",
        "Per-security subscriptions by capability and outcome"
    );
    describe_counter!(
        "broker_workspace_assemblies_total",
        "Assembly runs by outcome"
    );
    describe_counter!(
        "broker_workspace_timers_armed_total",
        "Scheduler timers armed"
    );

    describe_gauge!(
        "broker_workspace_bindings",
        "Number of live workspace bindings"
    );

    describe_histogram!(
        "broker_workspace_assembly_seconds",
        "Time to run a full assembly"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn outcome(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

/// Record a session lookup.
pub fn record_lookup(stage: Stage, ok: bool) {
    counter!(
        "broker_workspace_lookups_total",
        "stage" => stage.as_str(),
        "outcome" => outcome(ok)
    )
    .increment(1);
}

/// Record a subscription attempt.
pub fn record_subscription(capability: Capability, ok: bool) {
    counter!(
        "broker_workspace_subscriptions_total",
        "capability" => capability.as_str(),
        "outcome" => outcome(ok)
    )
    .increment(1);
}

/// Record a finished assembly run.
pub fn record_assembly(error: Option<&AssemblyError>, duration: Duration) {
    let result = error.map_or("ok", AssemblyError::kind);
    counter!("broker_workspace_assemblies_total", "outcome" => result).increment(1);
    histogram!("broker_workspace_assembly_seconds").record(duration.as_secs_f64());
}

/// Record a scheduler timer being armed.
pub fn record_timer_armed() {
    counter!("broker_workspace_timers_armed_total").increment(1);
}

/// Update the workspace binding count.
#[allow(clippy::cast_precision_loss)]
pub fn set_workspace_bindings(count: usize) {
    gauge!("broker_workspace_bindings").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
