//! Paper securities and their capabilities.

use std::sync::Arc;

use async_trait::async_trait;

use super::Shared;
use crate::application::ports::{
    BrokerError, BrokerResult, Charts, Curve, Depth, Fundamentals, OptionChain, Quote, Security,
    Study,
};
use crate::domain::market::{Contract, SecurityType};

/// Tick types the paper quote accepts.
const TICK_TYPES: &[&str] = &[
    "ticks",
    "volatility",
    "fundamentals",
    "dividends",
    "news",
    "shortable",
];

/// Journals a capability call against one symbol.
#[derive(Clone)]
struct Journal {
    symbol: String,
    shared: Arc<Shared>,
}

impl Journal {
    fn record(&self, action: impl Into<String>) {
        self.shared.record(&self.symbol, action);
    }

    async fn request(&self, action: impl Into<String>) -> BrokerResult<()> {
        let action = action.into();
        if let Err(error) = self.shared.ensure_open() {
            self.record(format!("{action} rejected"));
            return Err(error);
        }
        self.shared.pause().await;
        self.record(action);
        Ok(())
    }
}

// =============================================================================
// Security
// =============================================================================

/// A resolved paper security. Every capability is available.
pub struct PaperSecurity {
    contract: Contract,
    journal: Journal,
    quote: Arc<PaperQuote>,
    depth: Arc<PaperDepth>,
    charts: Arc<PaperCharts>,
    fundamentals: Arc<PaperFundamentals>,
}

impl PaperSecurity {
    pub(super) fn new(
        symbol: &str,
        security_type: SecurityType,
        markets_open: bool,
        shared: &Arc<Shared>,
    ) -> Self {
        let journal = Journal {
            symbol: symbol.to_string(),
            shared: Arc::clone(shared),
        };
        Self {
            contract: Contract::new(symbol, security_type, markets_open),
            quote: Arc::new(PaperQuote(journal.clone())),
            depth: Arc::new(PaperDepth(journal.clone())),
            charts: Arc::new(PaperCharts(journal.clone())),
            fundamentals: Arc::new(PaperFundamentals(journal.clone())),
            journal,
        }
    }
}

impl Security for PaperSecurity {
    fn contract(&self) -> &Contract {
        &self.contract
    }

    fn quote(&self) -> Option<Arc<dyn Quote>> {
        Some(Arc::clone(&self.quote) as Arc<dyn Quote>)
    }

    fn depth(&self) -> Option<Arc<dyn Depth>> {
        Some(Arc::clone(&self.depth) as Arc<dyn Depth>)
    }

    fn charts(&self) -> Option<Arc<dyn Charts>> {
        Some(Arc::clone(&self.charts) as Arc<dyn Charts>)
    }

    fn fundamentals(&self) -> Option<Arc<dyn Fundamentals>> {
        Some(Arc::clone(&self.fundamentals) as Arc<dyn Fundamentals>)
    }

    fn cancel(&self) -> Option<BrokerResult<()>> {
        self.journal.record("cancel");
        Some(Ok(()))
    }
}

struct PaperQuote(Journal);

#[async_trait]
impl Quote for PaperQuote {
    fn enable(&self, tick_type: &str) -> BrokerResult<()> {
        if !TICK_TYPES.contains(&tick_type) {
            return Err(BrokerError::Rejected(format!("unknown tick type {tick_type}")));
        }
        self.0.record(format!("quote.enable {tick_type}"));
        Ok(())
    }

    fn add_field_types(&self, fields: &[String]) {
        self.0.record(format!("quote.fields {}", fields.join(",")));
    }

    async fn stream(&self) -> BrokerResult<()> {
        self.0.request("quote.stream").await
    }

    async fn query(&self) -> BrokerResult<()> {
        self.0.request("quote.query").await
    }
}

struct PaperDepth(Journal);

#[async_trait]
impl Depth for PaperDepth {
    async fn stream(&self, exchanges: &[String], rows: Option<u32>) -> BrokerResult<()> {
        let exchanges = if exchanges.is_empty() {
            "SMART".to_string()
        } else {
            exchanges.join(",")
        };
        let rows = rows.unwrap_or(5);
        self.0
            .request(format!("depth.stream {exchanges} rows={rows}"))
            .await
    }
}

struct PaperCharts(Journal);

#[async_trait]
impl Charts for PaperCharts {
    fn study(&self, study: &Study) {
        self.0.record(format!("charts.study {}", study.name));
    }

    async fn stream(&self) -> BrokerResult<()> {
        self.0.request("charts.stream").await
    }

    async fn history(&self, bar_size: &str) -> BrokerResult<()> {
        self.0.request(format!("charts.history {bar_size}")).await
    }
}

struct PaperFundamentals(Journal);

#[async_trait]
impl Fundamentals for PaperFundamentals {
    async fn report(&self, name: &str) -> BrokerResult<()> {
        if self.0.shared.report_fails(name) {
            self.0.record(format!("fundamentals.failed {name}"));
            return Err(BrokerError::Rejected(format!("no {name} report")));
        }
        self.0.request(format!("fundamentals {name}")).await
    }
}

// =============================================================================
// Curves and Chains
// =============================================================================

/// A paper curve; cancellable.
pub struct PaperCurve(Journal);

impl PaperCurve {
    pub(super) fn new(symbol: &str, shared: &Arc<Shared>) -> Self {
        Self(Journal {
            symbol: symbol.to_string(),
            shared: Arc::clone(shared),
        })
    }
}

impl Curve for PaperCurve {
    fn symbol(&self) -> &str {
        &self.0.symbol
    }

    fn cancel(&self) -> Option<BrokerResult<()>> {
        self.0.record("cancel");
        Some(Ok(()))
    }
}

/// A paper option chain; exposes no cancellation.
pub struct PaperChain {
    symbol: String,
}

impl PaperChain {
    pub(super) fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
        }
    }
}

impl OptionChain for PaperChain {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn cancel(&self) -> Option<BrokerResult<()>> {
        None
    }
}
