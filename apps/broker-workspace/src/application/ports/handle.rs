//! Workspace bindings for live broker objects.

use std::fmt;
use std::sync::Arc;

use super::{AccountFeed, BrokerError, BrokerResult, Curve, OptionChain, Security};
use crate::domain::workspace::Binding;

/// A live object bound into the workspace.
#[derive(Clone)]
pub enum Handle {
    /// A resolved security.
    Security(Arc<dyn Security>),
    /// A curve feed.
    Curve(Arc<dyn Curve>),
    /// An option chain.
    OptionChain(Arc<dyn OptionChain>),
    /// An account-level feed.
    Feed(Arc<dyn AccountFeed>),
}

impl Handle {
    /// Short name of the handle's kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Security(_) => "security",
            Self::Curve(_) => "curve",
            Self::OptionChain(_) => "chain",
            Self::Feed(_) => "feed",
        }
    }

    /// Whether both handles point at the same live object.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Security(a), Self::Security(b)) => Arc::ptr_eq(a, b),
            (Self::Curve(a), Self::Curve(b)) => Arc::ptr_eq(a, b),
            (Self::OptionChain(a), Self::OptionChain(b)) => Arc::ptr_eq(a, b),
            (Self::Feed(a), Self::Feed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// One-line description for the shell.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Security(s) => {
                let contract = s.contract();
                format!(
                    "security {} ({}, markets {})",
                    contract.symbol(),
                    contract.security_type(),
                    if contract.markets_open() { "open" } else { "closed" }
                )
            }
            Self::Curve(c) => format!("curve {}", c.symbol()),
            Self::OptionChain(c) => format!("chain {}", c.symbol()),
            Self::Feed(f) => format!("feed {}", f.kind().default_name()),
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl Binding for Handle {
    type Error = BrokerError;

    fn cancel(&self) -> Option<BrokerResult<()>> {
        match self {
            Self::Security(s) => s.cancel(),
            Self::Curve(c) => c.cancel(),
            Self::OptionChain(c) => c.cancel(),
            Self::Feed(f) => f.cancel(),
        }
    }
}
