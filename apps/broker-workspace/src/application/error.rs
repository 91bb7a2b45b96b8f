//! Assembly error types.

use thiserror::Error;

use super::ports::BrokerError;

/// Assembly stage that issued a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Account-level feeds.
    Feeds,
    /// Security resolution.
    Securities,
    /// Curve resolution.
    Curves,
    /// Option chain resolution.
    OptionChains,
}

impl Stage {
    /// Stage label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feeds => "feeds",
            Self::Securities => "securities",
            Self::Curves => "curves",
            Self::OptionChains => "option_chains",
        }
    }
}

/// Per-security capability touched by the fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Bar charts and historicals.
    Charts,
    /// Quotes.
    Quote,
    /// Market depth.
    Depth,
    /// Fundamental reports.
    Fundamentals,
}

impl Capability {
    /// Capability label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Charts => "charts",
            Self::Quote => "quote",
            Self::Depth => "depth",
            Self::Fundamentals => "fundamentals",
        }
    }
}

/// Errors surfaced by the environment and the subscription assembler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// The session could not resolve a symbol or load a feed.
    #[error("{} lookup failed for {symbol}: {source}", .stage.as_str())]
    Lookup {
        /// Stage that issued the lookup.
        stage: Stage,
        /// Symbol or feed name requested.
        symbol: String,
        /// Collaborator error.
        source: BrokerError,
    },

    /// A stream, query or history request failed.
    #[error("{} subscription failed for {symbol}: {source}", .capability.as_str())]
    Subscription {
        /// Security symbol.
        symbol: String,
        /// Capability being subscribed.
        capability: Capability,
        /// Collaborator error.
        source: BrokerError,
    },

    /// Cancelling a binding failed. The binding was still removed.
    #[error("cancelling {name} failed: {source}")]
    Cancellation {
        /// Workspace name being freed.
        name: String,
        /// Collaborator error.
        source: BrokerError,
    },
}

impl AssemblyError {
    /// Short error kind label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Lookup { .. } => "lookup",
            Self::Subscription { .. } => "subscription",
            Self::Cancellation { .. } => "cancellation",
        }
    }
}
