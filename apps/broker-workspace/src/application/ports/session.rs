//! Session facade and the non-security live objects it hands out.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{BrokerResult, Security};

/// Account-level feed kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Account values and portfolio.
    Account,
    /// Account summary tags across accounts.
    AccountSummary,
    /// Open positions.
    Positions,
    /// Executions and trades.
    Trades,
}

impl FeedKind {
    /// Workspace name used when the options do not override it.
    #[must_use]
    pub const fn default_name(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::AccountSummary => "accountSummary",
            Self::Positions => "positions",
            Self::Trades => "trades",
        }
    }
}

/// Options for an account-level feed.
///
/// `name` overrides the workspace name; every other key is passed through
/// to the session untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedOptions {
    /// Workspace name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Session-specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl FeedOptions {
    /// Workspace name for a feed of `kind` opened with these options.
    #[must_use]
    pub fn name_for(&self, kind: FeedKind) -> &str {
        self.name.as_deref().unwrap_or(kind.default_name())
    }
}

/// A yield or rate curve feed.
pub trait Curve: Send + Sync {
    /// Curve symbol; its workspace name.
    fn symbol(&self) -> &str;

    /// Cancel the curve's live subscriptions.
    fn cancel(&self) -> Option<BrokerResult<()>>;
}

/// Option contracts for one underlying.
pub trait OptionChain: Send + Sync {
    /// Underlying symbol; the chain's workspace name.
    fn symbol(&self) -> &str;

    /// Cancel the chain's live subscriptions.
    fn cancel(&self) -> Option<BrokerResult<()>>;
}

/// An account, account summary, positions or trades stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountFeed: Send + Sync {
    /// Which account feed this is.
    fn kind(&self) -> FeedKind;

    /// Resolves once the initial load completes, with its error if any.
    async fn loaded(&self) -> BrokerResult<()>;

    /// Cancel the feed.
    fn cancel(&self) -> Option<BrokerResult<()>>;
}

/// Broker session facade.
///
/// Every lookup suspends until the broker answers. Adapters own retry
/// policy; callers never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Session: Send + Sync {
    /// Resolve a symbol description (e.g. `"AAPL stock"`) to securities.
    async fn securities(&self, text: &str) -> BrokerResult<Vec<Arc<dyn Security>>>;

    /// Resolve a curve.
    async fn curve(&self, symbol: &str) -> BrokerResult<Arc<dyn Curve>>;

    /// Resolve an option chain.
    async fn chain(&self, symbol: &str) -> BrokerResult<Arc<dyn OptionChain>>;

    /// Open the account feed.
    fn account(&self, options: &FeedOptions) -> Arc<dyn AccountFeed>;

    /// Open the account summary feed.
    fn account_summary(&self, options: &FeedOptions) -> Arc<dyn AccountFeed>;

    /// Open the positions feed.
    fn positions(&self, options: &FeedOptions) -> Arc<dyn AccountFeed>;

    /// Open the trades feed.
    fn trades(&self, options: &FeedOptions) -> Arc<dyn AccountFeed>;

    /// Start streaming order updates. Fire-and-forget.
    fn stream_orders(&self);

    /// Whether the session serves frozen (last known) market data.
    fn frozen(&self) -> bool;

    /// Switch frozen market data on or off.
    fn set_frozen(&self, frozen: bool);

    /// Close the broker connection.
    async fn close(&self) -> BrokerResult<()>;
}
