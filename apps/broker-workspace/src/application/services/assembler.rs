//! Subscription Assembler
//!
//! Walks a normalized [`AssemblyPlan`] stage by stage, asking the session
//! for each requested object, binding it into the environment and
//! subscribing it. Stages run strictly in order and the first failure
//! aborts everything after it.
//!
//! ## Stage Order
//!
//! 1. account, 2. account summary, 3. positions, 4. orders,
//! 5. trades, 6. securities (each followed by its fan-out),
//! 7. curves, 8. option chains.

use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::application::error::AssemblyError;
use crate::application::ports::FeedOptions;
use crate::application::services::environment::Environment;
use crate::application::services::fanout::{Fanout, FanoutOptions};
use crate::infrastructure::metrics;

/// Normalized description of everything one assembly run subscribes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyPlan {
    /// Account feed options, if requested.
    pub account: Option<FeedOptions>,
    /// Account summary feed options, if requested.
    pub account_summary: Option<FeedOptions>,
    /// Positions feed options, if requested.
    pub positions: Option<FeedOptions>,
    /// Whether to stream order updates.
    pub orders: bool,
    /// Trades feed options, if requested.
    pub trades: Option<FeedOptions>,
    /// Security descriptions to resolve, in order.
    pub securities: Vec<String>,
    /// Curve symbols to resolve, in order.
    pub curves: Vec<String>,
    /// Option chain underlyings to resolve, in order.
    pub option_chains: Vec<String>,
    /// Serve frozen market data.
    pub frozen: bool,
    /// Per-security subscriptions.
    pub fanout: FanoutOptions,
}

/// What a successful run bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblySummary {
    /// Run identifier carried in the run's span.
    pub run_id: Uuid,
    /// Account-level feeds loaded.
    pub feeds: usize,
    /// Securities resolved and subscribed.
    pub securities: usize,
    /// Curves resolved.
    pub curves: usize,
    /// Option chains resolved.
    pub option_chains: usize,
}

/// Drives one plan against one environment.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionAssembler<'a> {
    env: &'a Environment,
    plan: &'a AssemblyPlan,
}

impl<'a> SubscriptionAssembler<'a> {
    /// Create an assembler for `plan` over `env`.
    #[must_use]
    pub const fn new(env: &'a Environment, plan: &'a AssemblyPlan) -> Self {
        Self { env, plan }
    }

    /// Run every stage in order.
    ///
    /// # Errors
    ///
    /// Returns the first stage error; later stages are never started.
    pub async fn assemble(&self) -> Result<AssemblySummary, AssemblyError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("assembly", %run_id);
        let started = Instant::now();

        let result = self.run_stages(run_id).instrument(span.clone()).await;

        span.in_scope(|| {
            metrics::record_assembly(result.as_ref().err(), started.elapsed());
            match &result {
                Ok(summary) => tracing::info!(
                    feeds = summary.feeds,
                    securities = summary.securities,
                    curves = summary.curves,
                    option_chains = summary.option_chains,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Assembly complete"
                ),
                Err(error) => tracing::error!(
                    error = %error,
                    kind = error.kind(),
                    "Assembly aborted"
                ),
            }
        });
        result
    }

    async fn run_stages(&self, run_id: Uuid) -> Result<AssemblySummary, AssemblyError> {
        let env = self.env;
        let plan = self.plan;
        let mut summary = AssemblySummary {
            run_id,
            feeds: 0,
            securities: 0,
            curves: 0,
            option_chains: 0,
        };

        if let Some(options) = &plan.account {
            env.account(options).await?;
            summary.feeds += 1;
        }
        if let Some(options) = &plan.account_summary {
            env.account_summary(options).await?;
            summary.feeds += 1;
        }
        if let Some(options) = &plan.positions {
            env.positions(options).await?;
            summary.feeds += 1;
        }
        if plan.orders {
            env.session().stream_orders();
            tracing::info!("Order stream started");
        }
        if let Some(options) = &plan.trades {
            env.trades(options).await?;
            summary.feeds += 1;
        }

        let fanout = Fanout::new(env, &plan.fanout);
        for text in &plan.securities {
            for security in env.security(text).await? {
                fanout.run(&security).await?;
                summary.securities += 1;
            }
        }

        if !plan.curves.is_empty() {
            summary.curves = env.curves(&plan.curves).await?.len();
        }
        if !plan.option_chains.is_empty() {
            summary.option_chains = env.option_chains(&plan.option_chains).await?.len();
        }

        Ok(summary)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockall::Sequence;
    use mockall::predicate::eq;

    use super::*;
    use crate::application::error::Stage;
    use crate::application::ports::{
        AccountFeed, BrokerError, BrokerResult, Charts, Curve, Depth, FeedKind, Fundamentals,
        MockAccountFeed, MockSession, OptionChain, Quote, Security,
    };
    use crate::domain::market::{Contract, SecurityType};

    struct Bare {
        contract: Contract,
    }

    impl Security for Bare {
        fn contract(&self) -> &Contract {
            &self.contract
        }
        fn quote(&self) -> Option<Arc<dyn Quote>> {
            None
        }
        fn depth(&self) -> Option<Arc<dyn Depth>> {
            None
        }
        fn charts(&self) -> Option<Arc<dyn Charts>> {
            None
        }
        fn fundamentals(&self) -> Option<Arc<dyn Fundamentals>> {
            None
        }
        fn cancel(&self) -> Option<BrokerResult<()>> {
            None
        }
    }

    struct Named(&'static str);

    impl Curve for Named {
        fn symbol(&self) -> &str {
            self.0
        }
        fn cancel(&self) -> Option<BrokerResult<()>> {
            None
        }
    }

    impl OptionChain for Named {
        fn symbol(&self) -> &str {
            self.0
        }
        fn cancel(&self) -> Option<BrokerResult<()>> {
            None
        }
    }

    fn loaded_feed(kind: FeedKind) -> Arc<dyn AccountFeed> {
        let mut feed = MockAccountFeed::new();
        feed.expect_kind().return_const(kind);
        feed.expect_loaded().returning(|| Ok(()));
        Arc::new(feed)
    }

    fn bare(symbol: &'static str) -> Arc<dyn Security> {
        Arc::new(Bare {
            contract: Contract::new(symbol, SecurityType::Stock, true),
        })
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let mut seq = Sequence::new();
        let mut session = MockSession::new();
        session
            .expect_account()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| loaded_feed(FeedKind::Account));
        session
            .expect_account_summary()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| loaded_feed(FeedKind::AccountSummary));
        session
            .expect_positions()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| loaded_feed(FeedKind::Positions));
        session
            .expect_stream_orders()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        session
            .expect_trades()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| loaded_feed(FeedKind::Trades));
        session
            .expect_securities()
            .with(eq("AAPL"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![bare("AAPL")]));
        session
            .expect_securities()
            .with(eq("MSFT"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![bare("MSFT")]));
        session
            .expect_curve()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Arc::new(Named("USD")) as Arc<dyn Curve>));
        session
            .expect_chain()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Arc::new(Named("SPX")) as Arc<dyn OptionChain>));
        let env = Environment::new(Arc::new(session));

        let plan = AssemblyPlan {
            account: Some(FeedOptions::default()),
            account_summary: Some(FeedOptions::default()),
            positions: Some(FeedOptions::default()),
            orders: true,
            trades: Some(FeedOptions::default()),
            securities: vec!["AAPL".to_string(), "MSFT".to_string()],
            curves: vec!["USD".to_string()],
            option_chains: vec!["SPX".to_string()],
            ..AssemblyPlan::default()
        };

        let summary = SubscriptionAssembler::new(&env, &plan).assemble().await.unwrap();

        assert_eq!(summary.feeds, 4);
        assert_eq!(summary.securities, 2);
        assert_eq!(summary.curves, 1);
        assert_eq!(summary.option_chains, 1);
        assert_eq!(
            env.symbols(),
            vec![
                "AAPL",
                "MSFT",
                "SPX",
                "USD",
                "account",
                "accountSummary",
                "positions",
                "trades"
            ]
        );
    }

    #[tokio::test]
    async fn empty_plan_touches_nothing() {
        let env = Environment::new(Arc::new(MockSession::new()));
        let plan = AssemblyPlan::default();

        let summary = SubscriptionAssembler::new(&env, &plan).assemble().await.unwrap();

        assert_eq!(summary.feeds + summary.securities, 0);
        assert!(env.is_empty());
    }

    #[tokio::test]
    async fn failed_security_aborts_later_stages() {
        let mut session = MockSession::new();
        session
            .expect_securities()
            .with(eq("BAD"))
            .times(1)
            .returning(|text| Err(BrokerError::NotFound(text.to_string())));
        session.expect_securities().with(eq("MSFT")).never();
        session.expect_curve().never();
        session.expect_chain().never();
        let env = Environment::new(Arc::new(session));

        let plan = AssemblyPlan {
            securities: vec!["BAD".to_string(), "MSFT".to_string()],
            curves: vec!["USD".to_string()],
            option_chains: vec!["SPX".to_string()],
            ..AssemblyPlan::default()
        };

        let err = SubscriptionAssembler::new(&env, &plan).assemble().await.unwrap_err();

        assert_eq!(
            err,
            AssemblyError::Lookup {
                stage: Stage::Securities,
                symbol: "BAD".to_string(),
                source: BrokerError::NotFound("BAD".to_string()),
            }
        );
        assert!(env.is_empty());
    }

    #[tokio::test]
    async fn failed_feed_load_aborts_before_orders() {
        let mut session = MockSession::new();
        session.expect_account().times(1).returning(|_| {
            let mut feed = MockAccountFeed::new();
            feed.expect_loaded().returning(|| Err(BrokerError::Closed));
            Arc::new(feed)
        });
        session.expect_stream_orders().never();
        session.expect_trades().never();
        let env = Environment::new(Arc::new(session));

        let plan = AssemblyPlan {
            account: Some(FeedOptions::default()),
            orders: true,
            trades: Some(FeedOptions::default()),
            ..AssemblyPlan::default()
        };

        let err = SubscriptionAssembler::new(&env, &plan).assemble().await.unwrap_err();

        assert!(matches!(err, AssemblyError::Lookup { stage: Stage::Feeds, .. }));
        // Bound before the load failed.
        assert!(env.get("account").is_some());
    }
}
