//! Subscription Fan-out
//!
//! Brings one resolved security into its configured streaming state.
//! Charts, quote, depth and fundamentals are independent sub-operations:
//! all four start together and all four run to completion before the
//! fan-out resolves. The first error to complete wins; later ones are
//! logged and dropped.
//!
//! When the market is closed, live streams are deferred to the contract's
//! markets-open signal in a background task tied to the environment's
//! shutdown token. Those deferred streams are never awaited here.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;

use crate::application::error::{AssemblyError, Capability};
use crate::application::ports::{BrokerError, BrokerResult, Charts, Security, Study};
use crate::application::services::environment::Environment;
use crate::domain::market::SecurityType;
use crate::infrastructure::metrics;

// =============================================================================
// Options
// =============================================================================

/// Chart subscription options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartOptions {
    /// Studies applied to every bar-size bucket.
    pub studies: Vec<Study>,
    /// Bar sizes whose history is fetched.
    pub historicals: Vec<String>,
}

/// Quote subscription options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteOptions {
    /// Extra tick types to enable.
    pub types: Vec<String>,
    /// Extra generic field types to request.
    pub fields: Vec<String>,
}

/// Depth subscription options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthOptions {
    /// Exchanges to stream depth from; empty means the broker default.
    pub exchanges: Vec<String>,
    /// Number of book rows.
    pub rows: Option<u32>,
}

/// What to subscribe for every resolved security.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanoutOptions {
    /// Charts, if requested.
    pub charts: Option<ChartOptions>,
    /// Quote, if requested.
    pub quote: Option<QuoteOptions>,
    /// Depth, if requested.
    pub depth: Option<DepthOptions>,
    /// Fundamental report names; empty means none.
    pub fundamentals: Vec<String>,
}

impl FanoutOptions {
    /// Whether any per-security subscription is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.charts.is_none()
            && self.quote.is_none()
            && self.depth.is_none()
            && self.fundamentals.is_empty()
    }
}

// =============================================================================
// Fan-out
// =============================================================================

type SubOperation<'a> = BoxFuture<'a, Result<(), AssemblyError>>;

/// Runs the per-security sub-operations for one environment.
#[derive(Debug, Clone, Copy)]
pub struct Fanout<'a> {
    env: &'a Environment,
    options: &'a FanoutOptions,
}

impl<'a> Fanout<'a> {
    /// Create a fan-out over `env` with the given options.
    #[must_use]
    pub const fn new(env: &'a Environment, options: &'a FanoutOptions) -> Self {
        Self { env, options }
    }

    /// Subscribe one security.
    ///
    /// # Errors
    ///
    /// Returns the first [`AssemblyError::Subscription`] to complete.
    pub async fn run(&self, security: &Arc<dyn Security>) -> Result<(), AssemblyError> {
        let symbol = security.contract().symbol();
        tracing::debug!(
            symbol,
            markets_open = security.contract().markets_open(),
            "Fan-out started"
        );

        let mut operations: FuturesUnordered<SubOperation<'_>> = FuturesUnordered::new();
        operations.push(Box::pin(self.charts(security)));
        operations.push(Box::pin(self.quote(security)));
        operations.push(Box::pin(self.depth(security)));
        operations.push(Box::pin(self.fundamentals(security)));

        let mut first_error = None;
        while let Some(result) = operations.next().await {
            if let Err(error) = result {
                if first_error.is_none() {
                    first_error = Some(error);
                } else {
                    tracing::debug!(symbol, error = %error, "Dropping later fan-out error");
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => {
                tracing::debug!(symbol, "Fan-out complete");
                Ok(())
            }
        }
    }

    async fn charts(&self, security: &Arc<dyn Security>) -> Result<(), AssemblyError> {
        let (Some(options), Some(charts)) = (&self.options.charts, security.charts()) else {
            return Ok(());
        };
        let contract = security.contract();

        for study in &options.studies {
            charts.study(study);
        }

        if contract.markets_open() {
            charts
                .stream()
                .await
                .map_err(|e| subscription_failed(contract.symbol(), Capability::Charts, e))?;
            metrics::record_subscription(Capability::Charts, true);
        } else {
            let deferred = Arc::clone(&charts);
            self.defer(security, Capability::Charts, move || async move {
                deferred.stream().await
            });
        }

        fetch_historicals(contract.symbol(), charts.as_ref(), &options.historicals).await
    }

    async fn quote(&self, security: &Arc<dyn Security>) -> Result<(), AssemblyError> {
        let (Some(options), Some(quote)) = (&self.options.quote, security.quote()) else {
            return Ok(());
        };
        let contract = security.contract();
        let symbol = contract.symbol();

        for tick_type in &options.types {
            quote
                .enable(tick_type)
                .map_err(|e| subscription_failed(symbol, Capability::Quote, e))?;
        }
        if !options.fields.is_empty() {
            quote.add_field_types(&options.fields);
        }

        if contract.markets_open() || self.env.session().frozen() {
            quote
                .stream()
                .await
                .map_err(|e| subscription_failed(symbol, Capability::Quote, e))?;
        } else {
            let deferred = Arc::clone(&quote);
            self.defer(security, Capability::Quote, move || async move {
                deferred.stream().await
            });
            quote
                .query()
                .await
                .map_err(|e| subscription_failed(symbol, Capability::Quote, e))?;
        }

        metrics::record_subscription(Capability::Quote, true);
        Ok(())
    }

    async fn depth(&self, security: &Arc<dyn Security>) -> Result<(), AssemblyError> {
        let (Some(options), Some(depth)) = (&self.options.depth, security.depth()) else {
            return Ok(());
        };
        let contract = security.contract();

        if contract.markets_open() {
            depth
                .stream(&options.exchanges, options.rows)
                .await
                .map_err(|e| subscription_failed(contract.symbol(), Capability::Depth, e))?;
            metrics::record_subscription(Capability::Depth, true);
        } else {
            let exchanges = options.exchanges.clone();
            let rows = options.rows;
            self.defer(security, Capability::Depth, move || async move {
                depth.stream(&exchanges, rows).await
            });
        }

        Ok(())
    }

    async fn fundamentals(&self, security: &Arc<dyn Security>) -> Result<(), AssemblyError> {
        let contract = security.contract();
        if self.options.fundamentals.is_empty() || contract.security_type() != SecurityType::Stock
        {
            return Ok(());
        }
        let Some(fundamentals) = security.fundamentals() else {
            return Ok(());
        };

        // One bad report name must not abort the rest of the batch.
        for report in &self.options.fundamentals {
            match fundamentals.report(report).await {
                Ok(()) => metrics::record_subscription(Capability::Fundamentals, true),
                Err(error) => {
                    metrics::record_subscription(Capability::Fundamentals, false);
                    tracing::warn!(
                        symbol = contract.symbol(),
                        report = %report,
                        error = %error,
                        "Fundamentals report failed, continuing"
                    );
                }
            }
        }

        Ok(())
    }

    /// Start `stream` once the security's market opens.
    fn defer<F, Fut>(&self, security: &Arc<dyn Security>, capability: Capability, stream: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BrokerResult<()>> + Send + 'static,
    {
        let security = Arc::clone(security);
        let shutdown = self.env.shutdown_token();
        tracing::debug!(
            symbol = security.contract().symbol(),
            capability = capability.as_str(),
            "Markets closed, deferring stream"
        );

        tokio::spawn(async move {
            let contract = security.contract();
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    tracing::debug!(
                        symbol = contract.symbol(),
                        capability = capability.as_str(),
                        "Session closed before markets opened"
                    );
                }
                () = contract.markets().opened() => {
                    if shutdown.is_cancelled() {
                        tracing::debug!(
                            symbol = contract.symbol(),
                            capability = capability.as_str(),
                            "Session closed as markets opened"
                        );
                        return;
                    }
                    match stream().await {
                        Ok(()) => {
                            metrics::record_subscription(capability, true);
                            tracing::info!(
                                symbol = contract.symbol(),
                                capability = capability.as_str(),
                                "Markets open, stream started"
                            );
                        }
                        Err(error) => {
                            metrics::record_subscription(capability, false);
                            tracing::warn!(
                                symbol = contract.symbol(),
                                capability = capability.as_str(),
                                error = %error,
                                "Deferred stream failed"
                            );
                        }
                    }
                }
            }
        });
    }
}

async fn fetch_historicals(
    symbol: &str,
    charts: &dyn Charts,
    bar_sizes: &[String],
) -> Result<(), AssemblyError> {
    for bar_size in bar_sizes {
        charts
            .history(bar_size)
            .await
            .map_err(|e| subscription_failed(symbol, Capability::Charts, e))?;
        tracing::debug!(symbol, bar_size = %bar_size, "History loaded");
    }
    Ok(())
}

fn subscription_failed(symbol: &str, capability: Capability, source: BrokerError) -> AssemblyError {
    metrics::record_subscription(capability, false);
    tracing::warn!(
        symbol,
        capability = capability.as_str(),
        error = %source,
        "Subscription failed"
    );
    AssemblyError::Subscription {
        symbol: symbol.to_string(),
        capability,
        source,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockall::predicate::eq;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{
        Depth, Fundamentals, MockCharts, MockDepth, MockFundamentals, MockQuote, MockSession,
        Quote,
    };
    use crate::domain::market::Contract;

    struct TestSecurity {
        contract: Contract,
        quote: Option<Arc<dyn Quote>>,
        depth: Option<Arc<dyn Depth>>,
        charts: Option<Arc<dyn Charts>>,
        fundamentals: Option<Arc<dyn Fundamentals>>,
    }

    impl TestSecurity {
        fn new(security_type: SecurityType, open: bool) -> Self {
            Self {
                contract: Contract::new("AAPL", security_type, open),
                quote: None,
                depth: None,
                charts: None,
                fundamentals: None,
            }
        }
    }

    impl Security for TestSecurity {
        fn contract(&self) -> &Contract {
            &self.contract
        }
        fn quote(&self) -> Option<Arc<dyn Quote>> {
            self.quote.clone()
        }
        fn depth(&self) -> Option<Arc<dyn Depth>> {
            self.depth.clone()
        }
        fn charts(&self) -> Option<Arc<dyn Charts>> {
            self.charts.clone()
        }
        fn fundamentals(&self) -> Option<Arc<dyn Fundamentals>> {
            self.fundamentals.clone()
        }
        fn cancel(&self) -> Option<BrokerResult<()>> {
            None
        }
    }

    fn env(frozen: bool) -> Environment {
        let mut session = MockSession::new();
        session.expect_frozen().return_const(frozen);
        Environment::new(Arc::new(session))
    }

    #[tokio::test]
    async fn empty_options_touch_nothing() {
        let env = env(false);
        let options = FanoutOptions::default();
        let mut security = TestSecurity::new(SecurityType::Stock, true);
        // Mocks with no expectations panic if called.
        security.quote = Some(Arc::new(MockQuote::new()));
        security.depth = Some(Arc::new(MockDepth::new()));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
    }

    #[tokio::test]
    async fn open_market_streams_quote_and_applies_options() {
        let env = env(false);
        let options = FanoutOptions {
            quote: Some(QuoteOptions {
                types: vec!["ticks".to_string()],
                fields: vec!["233".to_string()],
            }),
            ..FanoutOptions::default()
        };
        let mut quote = MockQuote::new();
        quote.expect_enable().with(eq("ticks")).times(1).returning(|_| Ok(()));
        quote.expect_add_field_types().times(1).return_const(());
        quote.expect_stream().times(1).returning(|| Ok(()));
        quote.expect_query().never();
        let mut security = TestSecurity::new(SecurityType::Stock, true);
        security.quote = Some(Arc::new(quote));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
    }

    #[tokio::test]
    async fn frozen_session_streams_quote_while_closed() {
        let env = env(true);
        let options = FanoutOptions {
            quote: Some(QuoteOptions::default()),
            ..FanoutOptions::default()
        };
        let mut quote = MockQuote::new();
        quote.expect_stream().times(1).returning(|| Ok(()));
        quote.expect_query().never();
        let mut security = TestSecurity::new(SecurityType::Stock, false);
        security.quote = Some(Arc::new(quote));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
    }

    #[tokio::test]
    async fn closed_market_queries_quote_and_streams_on_open() {
        let env = env(false);
        let options = FanoutOptions {
            quote: Some(QuoteOptions::default()),
            ..FanoutOptions::default()
        };
        let streams = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&streams);
        let mut quote = MockQuote::new();
        quote.expect_query().times(1).returning(|| Ok(()));
        quote.expect_stream().times(1).returning(move || {
            *counter.lock() += 1;
            Ok(())
        });
        let mut security = TestSecurity::new(SecurityType::Stock, false);
        security.quote = Some(Arc::new(quote));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
        assert_eq!(*streams.lock(), 0);

        security.contract().markets().open();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*streams.lock(), 1);
    }

    #[tokio::test]
    async fn closed_market_depth_completes_without_streaming() {
        let env = env(false);
        let options = FanoutOptions {
            depth: Some(DepthOptions {
                exchanges: vec!["ISLAND".to_string()],
                rows: Some(5),
            }),
            ..FanoutOptions::default()
        };
        let mut depth = MockDepth::new();
        depth.expect_stream().never();
        let mut security = TestSecurity::new(SecurityType::Stock, false);
        security.depth = Some(Arc::new(depth));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
    }

    #[tokio::test]
    async fn deferred_streams_abandoned_on_close() {
        // Close and open land before the listener's first poll, so both
        // branches are ready at once.
        for _ in 0..64 {
            let mut session = MockSession::new();
            session.expect_frozen().return_const(false);
            session.expect_close().returning(|| Ok(()));
            let env = Environment::new(Arc::new(session));
            let options = FanoutOptions {
                depth: Some(DepthOptions::default()),
                ..FanoutOptions::default()
            };
            let streams = Arc::new(Mutex::new(0));
            let counter = Arc::clone(&streams);
            let mut depth = MockDepth::new();
            depth.expect_stream().returning(move |_, _| {
                *counter.lock() += 1;
                Ok(())
            });
            let mut security = TestSecurity::new(SecurityType::Stock, false);
            security.depth = Some(Arc::new(depth));
            let security: Arc<dyn Security> = Arc::new(security);

            Fanout::new(&env, &options).run(&security).await.unwrap();
            env.close().await.unwrap();
            security.contract().markets().open();
            tokio::time::sleep(Duration::from_millis(5)).await;

            assert_eq!(*streams.lock(), 0);
        }
    }

    #[tokio::test]
    async fn listener_waiting_when_closed_never_streams() {
        let mut session = MockSession::new();
        session.expect_frozen().return_const(false);
        session.expect_close().returning(|| Ok(()));
        let env = Environment::new(Arc::new(session));
        let options = FanoutOptions {
            depth: Some(DepthOptions::default()),
            ..FanoutOptions::default()
        };
        let streams = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&streams);
        let mut depth = MockDepth::new();
        depth.expect_stream().returning(move |_, _| {
            *counter.lock() += 1;
            Ok(())
        });
        let mut security = TestSecurity::new(SecurityType::Stock, false);
        security.depth = Some(Arc::new(depth));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
        tokio::task::yield_now().await;
        env.close().await.unwrap();
        tokio::task::yield_now().await;

        security.contract().markets().open();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*streams.lock(), 0);
    }

    #[tokio::test]
    async fn open_market_charts_stream_then_fetch_historicals_in_order() {
        let env = env(false);
        let options = FanoutOptions {
            charts: Some(ChartOptions {
                studies: vec![Study {
                    name: "SMA".to_string(),
                    args: vec![serde_json::json!(20)],
                }],
                historicals: vec!["5 mins".to_string(), "1 hour".to_string()],
            }),
            ..FanoutOptions::default()
        };
        let mut seq = mockall::Sequence::new();
        let mut charts = MockCharts::new();
        charts.expect_study().times(1).in_sequence(&mut seq).return_const(());
        charts.expect_stream().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        charts
            .expect_history()
            .with(eq("5 mins"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        charts
            .expect_history()
            .with(eq("1 hour"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let mut security = TestSecurity::new(SecurityType::Stock, true);
        security.charts = Some(Arc::new(charts));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
    }

    #[tokio::test]
    async fn closed_market_charts_still_fetch_historicals() {
        let env = env(false);
        let options = FanoutOptions {
            charts: Some(ChartOptions {
                studies: vec![],
                historicals: vec!["1 day".to_string()],
            }),
            ..FanoutOptions::default()
        };
        let mut charts = MockCharts::new();
        charts.expect_stream().never();
        charts.expect_history().times(1).returning(|_| Ok(()));
        let mut security = TestSecurity::new(SecurityType::Stock, false);
        security.charts = Some(Arc::new(charts));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
    }

    #[tokio::test]
    async fn chart_stream_error_skips_historicals() {
        let env = env(false);
        let options = FanoutOptions {
            charts: Some(ChartOptions {
                studies: vec![],
                historicals: vec!["1 day".to_string()],
            }),
            ..FanoutOptions::default()
        };
        let mut charts = MockCharts::new();
        charts
            .expect_stream()
            .returning(|| Err(BrokerError::Pacing("historical data".to_string())));
        charts.expect_history().never();
        let mut security = TestSecurity::new(SecurityType::Stock, true);
        security.charts = Some(Arc::new(charts));
        let security: Arc<dyn Security> = Arc::new(security);

        let err = Fanout::new(&env, &options).run(&security).await.unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Subscription { capability: Capability::Charts, .. }
        ));
    }

    #[tokio::test]
    async fn one_failure_still_runs_siblings_to_completion() {
        let env = env(false);
        let options = FanoutOptions {
            quote: Some(QuoteOptions::default()),
            depth: Some(DepthOptions::default()),
            ..FanoutOptions::default()
        };
        let mut quote = MockQuote::new();
        quote
            .expect_stream()
            .returning(|| Err(BrokerError::Rejected("no market data permissions".to_string())));
        let mut depth = MockDepth::new();
        depth.expect_stream().times(1).returning(|_, _| Ok(()));
        let mut security = TestSecurity::new(SecurityType::Stock, true);
        security.quote = Some(Arc::new(quote));
        security.depth = Some(Arc::new(depth));
        let security: Arc<dyn Security> = Arc::new(security);

        let err = Fanout::new(&env, &options).run(&security).await.unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Subscription { capability: Capability::Quote, .. }
        ));
    }

    #[tokio::test]
    async fn fundamentals_swallow_individual_report_errors() {
        let env = env(false);
        let options = FanoutOptions {
            fundamentals: vec!["badReport".to_string(), "snapshot".to_string()],
            ..FanoutOptions::default()
        };
        let mut seq = mockall::Sequence::new();
        let mut fundamentals = MockFundamentals::new();
        fundamentals
            .expect_report()
            .with(eq("badReport"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Err(BrokerError::Rejected(name.to_string())));
        fundamentals
            .expect_report()
            .with(eq("snapshot"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let mut security = TestSecurity::new(SecurityType::Stock, true);
        security.fundamentals = Some(Arc::new(fundamentals));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
    }

    #[tokio::test]
    async fn fundamentals_skipped_for_non_stock() {
        let env = env(false);
        let options = FanoutOptions {
            fundamentals: vec!["snapshot".to_string()],
            ..FanoutOptions::default()
        };
        let mut fundamentals = MockFundamentals::new();
        fundamentals.expect_report().never();
        let mut security = TestSecurity::new(SecurityType::Future, true);
        security.fundamentals = Some(Arc::new(fundamentals));
        let security: Arc<dyn Security> = Arc::new(security);

        Fanout::new(&env, &options).run(&security).await.unwrap();
    }
}
