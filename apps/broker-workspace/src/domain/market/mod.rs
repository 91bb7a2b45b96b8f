//! Contract Metadata and Market Hours
//!
//! Contract descriptors for resolved securities and the single-fire
//! "markets open" notification that gates live streaming.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

// =============================================================================
// Security Type
// =============================================================================

/// Security classification reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityType {
    /// Common stock.
    #[default]
    Stock,
    /// Listed option.
    Option,
    /// Future contract.
    Future,
    /// Foreign exchange pair.
    Forex,
    /// Index.
    Index,
    /// Anything the broker reports that is not modelled above.
    Other,
}

impl SecurityType {
    /// Parse a security type keyword, case-insensitive.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "stock" | "stk" => Self::Stock,
            "option" | "opt" => Self::Option,
            "future" | "fut" => Self::Future,
            "forex" | "cash" | "fx" => Self::Forex,
            "index" | "ind" => Self::Index,
            _ => Self::Other,
        }
    }

    /// Get the security type keyword.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Option => "option",
            Self::Future => "future",
            Self::Forex => "forex",
            Self::Index => "index",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Markets Open Signal
// =============================================================================

/// Single-fire notification that the contract's market has opened.
///
/// Waiting after the market is already open resolves immediately, so late
/// subscribers behave like the "already open" checks done at subscribe time.
#[derive(Debug)]
pub struct MarketsOpen {
    tx: watch::Sender<bool>,
}

impl Default for MarketsOpen {
    fn default() -> Self {
        Self::new(false)
    }
}

impl MarketsOpen {
    /// Create a signal in the given initial state.
    #[must_use]
    pub fn new(open: bool) -> Self {
        let (tx, _rx) = watch::channel(open);
        Self { tx }
    }

    /// Whether the market is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Mark the market open, waking every waiter.
    ///
    /// Returns `true` on the closed to open transition.
    pub fn open(&self) -> bool {
        self.tx.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        })
    }

    /// Mark the market closed.
    pub fn close(&self) {
        self.tx.send_if_modified(|open| std::mem::replace(open, false));
    }

    /// Wait until the market is open.
    pub async fn opened(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|open| *open).await;
    }
}

// =============================================================================
// Contract
// =============================================================================

/// Contract metadata for a resolved security.
#[derive(Debug)]
pub struct Contract {
    symbol: String,
    security_type: SecurityType,
    markets: MarketsOpen,
}

impl Contract {
    /// Create a contract descriptor.
    #[must_use]
    pub fn new(symbol: impl Into<String>, security_type: SecurityType, markets_open: bool) -> Self {
        Self {
            symbol: symbol.into(),
            security_type,
            markets: MarketsOpen::new(markets_open),
        }
    }

    /// Contract symbol; the security's workspace name.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Security classification.
    #[must_use]
    pub const fn security_type(&self) -> SecurityType {
        self.security_type
    }

    /// Whether the contract's market is open right now.
    #[must_use]
    pub fn markets_open(&self) -> bool {
        self.markets.is_open()
    }

    /// Market hours signal.
    #[must_use]
    pub const fn markets(&self) -> &MarketsOpen {
        &self.markets
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use test_case::test_case;

    use super::*;

    #[test_case("stock", SecurityType::Stock)]
    #[test_case("STK", SecurityType::Stock)]
    #[test_case("opt", SecurityType::Option)]
    #[test_case("Future", SecurityType::Future)]
    #[test_case("cash", SecurityType::Forex)]
    #[test_case("ind", SecurityType::Index)]
    #[test_case("bond", SecurityType::Other)]
    fn security_type_parsing(input: &str, expected: SecurityType) {
        assert_eq!(SecurityType::from_str_case_insensitive(input), expected);
    }

    #[test]
    fn open_fires_once() {
        let signal = MarketsOpen::new(false);
        assert!(!signal.is_open());
        assert!(signal.open());
        assert!(!signal.open());
        assert!(signal.is_open());
    }

    #[tokio::test]
    async fn opened_resolves_immediately_when_already_open() {
        let signal = MarketsOpen::new(true);
        tokio::time::timeout(Duration::from_millis(50), signal.opened())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn opened_wakes_waiters() {
        let contract = Arc::new(Contract::new("AAPL", SecurityType::Stock, false));
        let waiter = {
            let contract = Arc::clone(&contract);
            tokio::spawn(async move { contract.markets().opened().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        contract.markets().open();
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(contract.markets_open());
    }

    #[test]
    fn close_resets_state() {
        let signal = MarketsOpen::new(true);
        signal.close();
        assert!(!signal.is_open());
        assert!(signal.open());
    }
}
