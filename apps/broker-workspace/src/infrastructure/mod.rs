//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus process plumbing.

/// Configuration tree and process settings.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-memory paper session adapter.
pub mod paper;

/// Interactive shell over the workspace.
pub mod shell;

/// OpenTelemetry tracing integration.
pub mod telemetry;
