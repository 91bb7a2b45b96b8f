//! Port Interfaces
//!
//! Defines the interfaces (ports) for the broker collaborator following
//! the Hexagonal Architecture pattern. These are the contracts that
//! session adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Session`: symbol lookup, account feeds, order streaming
//! - `Security`: capability-bearing handle for a resolved contract
//! - `Quote`, `Depth`, `Charts`, `Fundamentals`: per-security capabilities
//! - `Curve`, `OptionChain`, `AccountFeed`: other live objects
//!
//! ## Bindings
//!
//! - `Handle`: any live object that can be bound into the workspace

mod handle;
mod security;
mod session;

pub use handle::Handle;
pub use security::{Charts, Depth, Fundamentals, Quote, Security, Study};
pub use session::{AccountFeed, Curve, FeedKind, FeedOptions, OptionChain, Session};

#[cfg(test)]
pub use security::{MockCharts, MockDepth, MockFundamentals, MockQuote};
#[cfg(test)]
pub use session::{MockAccountFeed, MockSession};

/// Convenience alias for collaborator results.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Error type returned by session collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The broker could not resolve the requested symbol.
    #[error("no security definition found for {0}")]
    NotFound(String),
    /// The broker rejected the request.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// Request pacing limit hit on this connection.
    #[error("pacing violation: {0}")]
    Pacing(String),
    /// Transport-level failure (socket, timeout).
    #[error("transport error: {0}")]
    Transport(String),
    /// The session has been closed.
    #[error("session closed")]
    Closed,
}
