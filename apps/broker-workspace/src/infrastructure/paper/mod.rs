//! Paper Session Adapter
//!
//! Deterministic in-memory implementation of the session ports. Nothing
//! touches the network: lookups succeed for any symbol not listed as
//! unknown, streams resolve after the configured latency, and every call
//! is appended to a journal that tests and the shell can inspect.
//!
//! Markets can start closed and open later through the scheduler, which
//! wakes every deferred stream registered against the contracts.

mod security;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;

pub use security::{PaperChain, PaperCurve, PaperSecurity};

use crate::application::ports::{
    AccountFeed, BrokerError, BrokerResult, Curve, FeedKind, FeedOptions, OptionChain, Security,
    Session,
};
use crate::application::services::Scheduler;
use crate::domain::market::SecurityType;
use crate::infrastructure::config::PaperSettings;

/// Target used for session-level journal entries.
const SESSION_TARGET: &str = "session";

/// One journaled call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Symbol or feed name the call was made against.
    pub target: String,
    /// What was done.
    pub action: String,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.target, self.action)
    }
}

/// State shared by the session and every object it hands out.
pub(crate) struct Shared {
    settings: PaperSettings,
    frozen: AtomicBool,
    closed: AtomicBool,
    markets_open: AtomicBool,
    journal: Mutex<Vec<Call>>,
    securities: Mutex<Vec<Weak<PaperSecurity>>>,
}

impl Shared {
    fn record(&self, target: &str, action: impl Into<String>) {
        self.journal.lock().push(Call {
            target: target.to_string(),
            action: action.into(),
        });
    }

    fn ensure_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }

    async fn pause(&self) {
        if self.settings.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.latency_ms)).await;
        }
    }

    fn is_unknown(&self, symbol: &str) -> bool {
        self.settings
            .unknown
            .iter()
            .any(|unknown| unknown.eq_ignore_ascii_case(symbol))
    }

    fn report_fails(&self, name: &str) -> bool {
        self.settings.failing_reports.iter().any(|r| r == name)
    }

    fn open_markets(&self) -> usize {
        self.markets_open.store(true, Ordering::Release);
        let mut securities = self.securities.lock();
        securities.retain(|weak| weak.strong_count() > 0);
        let opened = securities
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|security| security.contract().markets().open())
            .count();
        drop(securities);

        self.record(SESSION_TARGET, "markets.open");
        tracing::info!(opened, "Paper markets open");
        opened
    }
}

// =============================================================================
// Session
// =============================================================================

/// In-memory broker session.
///
/// Cheap to clone; clones share the same journal and market state.
#[derive(Clone)]
pub struct PaperSession {
    shared: Arc<Shared>,
    scheduler: Scheduler,
}

impl fmt::Debug for PaperSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaperSession")
            .field("markets_open", &self.markets_open())
            .field("closed", &self.is_closed())
            .field("calls", &self.shared.journal.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for PaperSession {
    fn default() -> Self {
        Self::new(PaperSettings::default())
    }
}

impl PaperSession {
    /// Open a paper session.
    ///
    /// When markets start closed and `opens_in_secs` is set, the opening is
    /// scheduled; that requires a Tokio runtime.
    #[must_use]
    pub fn new(settings: PaperSettings) -> Self {
        let markets_open = settings.markets_open;
        let opens_in = settings.opens_in_secs;
        let session = Self {
            shared: Arc::new(Shared {
                settings,
                frozen: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                markets_open: AtomicBool::new(markets_open),
                journal: Mutex::new(Vec::new()),
                securities: Mutex::new(Vec::new()),
            }),
            scheduler: Scheduler::new(),
        };

        let opens_at = opens_in
            .filter(|_| !markets_open)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(TimeDelta::try_seconds)
            .and_then(|delay| Utc::now().checked_add_signed(delay));
        if let Some(at) = opens_at {
            let shared = Arc::downgrade(&session.shared);
            session.scheduler.notify(&at, move || {
                if let Some(shared) = shared.upgrade() {
                    shared.open_markets();
                }
            });
            tracing::info!(opens_at = %at, "Paper markets closed, opening scheduled");
        }

        session
    }

    /// Open the markets now, waking deferred streams.
    ///
    /// Returns how many live contracts changed state.
    pub fn open_markets(&self) -> usize {
        self.shared.open_markets()
    }

    /// Whether markets are open for newly resolved securities.
    #[must_use]
    pub fn markets_open(&self) -> bool {
        self.shared.markets_open.load(Ordering::Acquire)
    }

    /// Whether the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn journal(&self) -> Vec<Call> {
        self.shared.journal.lock().clone()
    }

    /// Journal entries rendered as `"<target> <action>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.shared
            .journal
            .lock()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Journal entries against one target.
    #[must_use]
    pub fn calls_for(&self, target: &str) -> Vec<String> {
        self.shared
            .journal
            .lock()
            .iter()
            .filter(|call| call.target == target)
            .map(|call| call.action.clone())
            .collect()
    }

    /// The scheduler driving the simulated market open.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn feed(&self, kind: FeedKind, options: &FeedOptions) -> Arc<dyn AccountFeed> {
        let name = options.name_for(kind).to_string();
        self.shared.record(&name, "open");
        Arc::new(PaperFeed {
            kind,
            name,
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Split `"AAPL stock"` into a symbol and security type.
fn parse_description(text: &str) -> Option<(String, SecurityType)> {
    let mut words = text.split_whitespace();
    let symbol = words.next()?.to_uppercase();
    let security_type = words
        .next()
        .map_or(SecurityType::Stock, SecurityType::from_str_case_insensitive);
    Some((symbol, security_type))
}

#[async_trait]
impl Session for PaperSession {
    async fn securities(&self, text: &str) -> BrokerResult<Vec<Arc<dyn Security>>> {
        self.shared.ensure_open()?;
        self.shared.pause().await;

        let Some((symbol, security_type)) = parse_description(text) else {
            return Err(BrokerError::Rejected("empty security description".to_string()));
        };
        if self.shared.is_unknown(&symbol) {
            self.shared.record(&symbol, "lookup.failed");
            return Err(BrokerError::NotFound(text.to_string()));
        }

        let security = Arc::new(PaperSecurity::new(
            &symbol,
            security_type,
            self.markets_open(),
            &self.shared,
        ));
        self.shared.securities.lock().push(Arc::downgrade(&security));
        self.shared.record(&symbol, "lookup");

        Ok(vec![security as Arc<dyn Security>])
    }

    async fn curve(&self, symbol: &str) -> BrokerResult<Arc<dyn Curve>> {
        self.shared.ensure_open()?;
        self.shared.pause().await;
        if self.shared.is_unknown(symbol) {
            self.shared.record(symbol, "curve.failed");
            return Err(BrokerError::NotFound(symbol.to_string()));
        }

        self.shared.record(symbol, "curve");
        Ok(Arc::new(PaperCurve::new(symbol, &self.shared)))
    }

    async fn chain(&self, symbol: &str) -> BrokerResult<Arc<dyn OptionChain>> {
        self.shared.ensure_open()?;
        self.shared.pause().await;
        if self.shared.is_unknown(symbol) {
            self.shared.record(symbol, "chain.failed");
            return Err(BrokerError::NotFound(symbol.to_string()));
        }

        self.shared.record(symbol, "chain");
        Ok(Arc::new(PaperChain::new(symbol)))
    }

    fn account(&self, options: &FeedOptions) -> Arc<dyn AccountFeed> {
        self.feed(FeedKind::Account, options)
    }

    fn account_summary(&self, options: &FeedOptions) -> Arc<dyn AccountFeed> {
        self.feed(FeedKind::AccountSummary, options)
    }

    fn positions(&self, options: &FeedOptions) -> Arc<dyn AccountFeed> {
        self.feed(FeedKind::Positions, options)
    }

    fn trades(&self, options: &FeedOptions) -> Arc<dyn AccountFeed> {
        self.feed(FeedKind::Trades, options)
    }

    fn stream_orders(&self) {
        self.shared.record("orders", "stream");
    }

    fn frozen(&self) -> bool {
        self.shared.frozen.load(Ordering::Acquire)
    }

    fn set_frozen(&self, frozen: bool) {
        self.shared.frozen.store(frozen, Ordering::Release);
    }

    async fn close(&self) -> BrokerResult<()> {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.record(SESSION_TARGET, "close");
            tracing::info!("Paper session closed");
        }
        Ok(())
    }
}

// =============================================================================
// Account Feeds
// =============================================================================

struct PaperFeed {
    kind: FeedKind,
    name: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl AccountFeed for PaperFeed {
    fn kind(&self) -> FeedKind {
        self.kind
    }

    async fn loaded(&self) -> BrokerResult<()> {
        self.shared.ensure_open()?;
        self.shared.pause().await;
        if self.shared.is_unknown(&self.name) {
            self.shared.record(&self.name, "load.failed");
            return Err(BrokerError::NotFound(self.name.clone()));
        }
        self.shared.record(&self.name, "loaded");
        Ok(())
    }

    fn cancel(&self) -> Option<BrokerResult<()>> {
        self.shared.record(&self.name, "cancel");
        Some(Ok(()))
    }
}

// =============================================================================
// Tests
// =============================================================================
