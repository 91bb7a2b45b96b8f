#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Broker Workspace - Session Workspace and Subscription Assembly
//!
//! Opens a broker session, subscribes to the account and market-data feeds
//! described by a JSON configuration tree, and keeps every live object in a
//! named workspace that an interactive shell can inspect.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Registry and contract types
//!   - `workspace`: Ordered name → binding registry
//!   - `market`: Contract metadata and the markets-open signal
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Session, security and feed interfaces
//!   - `services`: Scheduler, environment, assembler, fan-out, setup
//!   - `error`: Assembly error taxonomy
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `config`: Configuration tree and process settings
//!   - `paper`: In-memory session adapter
//!   - `shell`: Interactive shell
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! config.json ──► AssemblyPlan ──► SubscriptionAssembler ──► Session
//!                                          │                    │
//!                                          ▼                    ▼
//!                                     Environment ◄──── securities, feeds
//!                                          │
//!                                          ▼
//!                                        Shell
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Workspace registry and contract types.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{Contract, MarketsOpen, SecurityType};
pub use domain::workspace::{Binding, Freed, Workspace};

// Ports
pub use application::ports::{
    AccountFeed, BrokerError, BrokerResult, Charts, Curve, Depth, FeedKind, FeedOptions,
    Fundamentals, Handle, OptionChain, Quote, Security, Session, Study,
};

// Services
pub use application::error::{AssemblyError, Capability, Stage};
pub use application::services::{
    AssemblyPlan, AssemblySummary, Environment, FanoutOptions, Scheduler, SubscriptionAssembler,
    setup,
};

// Infrastructure config
pub use infrastructure::config::{
    AssemblyConfig, Cli, ConfigError, PaperSettings, WorkspaceSettings,
};

// Paper session (for integration tests)
pub use infrastructure::paper::{Call, PaperSession};

// Shell
pub use infrastructure::shell::{Command, Shell, ShellError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
