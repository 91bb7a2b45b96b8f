//! Environment Façade
//!
//! The workspace registry bound to one broker session, plus the lookup
//! helpers that resolve symbols through the session and register the
//! results.
//!
//! All registry mutation goes through [`Environment::assign`] and
//! [`Environment::free`]. The registry lock is never held across an
//! `.await`.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::application::error::{AssemblyError, Stage};
use crate::application::ports::{
    AccountFeed, BrokerError, Curve, FeedKind, FeedOptions, Handle, OptionChain, Security, Session,
};
use crate::domain::workspace::{Freed, Workspace};
use crate::infrastructure::metrics;

/// Workspace of live objects bound to a broker session.
pub struct Environment {
    session: Arc<dyn Session>,
    workspace: RwLock<Workspace<Handle>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("symbols", &self.symbols())
            .field("closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Create an empty environment around an open session.
    #[must_use]
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            workspace: RwLock::new(Workspace::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// Token cancelled when the environment closes.
    ///
    /// Background listeners select on it so they stop with the session.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Bind `handle` under `name` unless the name is already bound.
    pub fn assign(&self, name: impl Into<String>, handle: Handle) -> &Self {
        let name = name.into();
        let len = {
            let mut workspace = self.workspace.write();
            if workspace.contains(&name) {
                tracing::debug!(name = %name, "Already bound, keeping existing binding");
                return self;
            }
            workspace.assign(name.clone(), handle);
            workspace.len()
        };

        tracing::debug!(name = %name, "Bound");
        metrics::set_workspace_bindings(len);
        self
    }

    /// Cancel and remove a binding.
    ///
    /// Freeing an unbound name is a no-op. When cancellation fails the
    /// binding is still removed and the failure is returned. The handle's
    /// `cancel` runs under the registry lock and must not re-enter the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Cancellation`] if the handle's cancel failed.
    pub fn free(&self, name: &str) -> Result<&Self, AssemblyError> {
        let (freed, len) = {
            let mut workspace = self.workspace.write();
            let freed = workspace.free(name);
            (freed, workspace.len())
        };

        match freed {
            Freed::Unbound => Ok(self),
            Freed::Removed(cancelled) => {
                metrics::set_workspace_bindings(len);
                tracing::debug!(name, "Freed");
                match cancelled {
                    Some(Err(source)) => Err(AssemblyError::Cancellation {
                        name: name.to_string(),
                        source,
                    }),
                    Some(Ok(())) | None => Ok(self),
                }
            }
        }
    }

    /// Look up a binding.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Handle> {
        self.workspace.read().get(name).cloned()
    }

    /// Bound names in sorted order.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.workspace.read().symbols().to_vec()
    }

    /// Snapshot of every binding in symbol order.
    ///
    /// This is what the interactive shell exposes as named bindings.
    #[must_use]
    pub fn bindings(&self) -> Vec<(String, Handle)> {
        self.workspace
            .read()
            .iter()
            .map(|(name, handle)| (name.to_string(), handle.clone()))
            .collect()
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workspace.read().len()
    }

    /// Check if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workspace.read().is_empty()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Resolve one symbol description and bind every security it yields
    /// under its contract symbol.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Lookup`] if the session cannot resolve it.
    pub async fn security(&self, text: &str) -> Result<Vec<Arc<dyn Security>>, AssemblyError> {
        let securities = self
            .session
            .securities(text)
            .await
            .map_err(|source| lookup_failed(Stage::Securities, text, source))?;
        metrics::record_lookup(Stage::Securities, true);

        for security in &securities {
            self.assign(
                security.contract().symbol(),
                Handle::Security(Arc::clone(security)),
            );
        }

        tracing::info!(query = text, resolved = securities.len(), "Securities resolved");
        Ok(securities)
    }

    /// Resolve symbols one at a time, left to right, and bind the results.
    ///
    /// Stops at the first failed lookup.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Lookup`] for the first symbol that fails.
    pub async fn securities(
        &self,
        symbols: &[String],
    ) -> Result<Vec<Arc<dyn Security>>, AssemblyError> {
        let mut resolved = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            resolved.extend(self.security(symbol).await?);
        }
        Ok(resolved)
    }

    /// Resolve curves sequentially and bind them.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Lookup`] for the first symbol that fails.
    pub async fn curves(&self, symbols: &[String]) -> Result<Vec<Arc<dyn Curve>>, AssemblyError> {
        let mut resolved = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let curve = self
                .session
                .curve(symbol)
                .await
                .map_err(|source| lookup_failed(Stage::Curves, symbol, source))?;
            metrics::record_lookup(Stage::Curves, true);

            self.assign(curve.symbol(), Handle::Curve(Arc::clone(&curve)));
            tracing::info!(symbol = %symbol, "Curve resolved");
            resolved.push(curve);
        }
        Ok(resolved)
    }

    /// Resolve option chains sequentially and bind them.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Lookup`] for the first symbol that fails.
    pub async fn option_chains(
        &self,
        symbols: &[String],
    ) -> Result<Vec<Arc<dyn OptionChain>>, AssemblyError> {
        let mut resolved = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let chain = self
                .session
                .chain(symbol)
                .await
                .map_err(|source| lookup_failed(Stage::OptionChains, symbol, source))?;
            metrics::record_lookup(Stage::OptionChains, true);

            self.assign(chain.symbol(), Handle::OptionChain(Arc::clone(&chain)));
            tracing::info!(symbol = %symbol, "Option chain resolved");
            resolved.push(chain);
        }
        Ok(resolved)
    }

    /// Open and bind the account feed, then wait for its initial load.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Lookup`] if the initial load fails.
    pub async fn account(
        &self,
        options: &FeedOptions,
    ) -> Result<Arc<dyn AccountFeed>, AssemblyError> {
        self.open_feed(FeedKind::Account, options).await
    }

    /// Open and bind the account summary feed, then wait for its initial load.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Lookup`] if the initial load fails.
    pub async fn account_summary(
        &self,
        options: &FeedOptions,
    ) -> Result<Arc<dyn AccountFeed>, AssemblyError> {
        self.open_feed(FeedKind::AccountSummary, options).await
    }

    /// Open and bind the positions feed, then wait for its initial load.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Lookup`] if the initial load fails.
    pub async fn positions(
        &self,
        options: &FeedOptions,
    ) -> Result<Arc<dyn AccountFeed>, AssemblyError> {
        self.open_feed(FeedKind::Positions, options).await
    }

    /// Open and bind the trades feed, then wait for its initial load.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Lookup`] if the initial load fails.
    pub async fn trades(
        &self,
        options: &FeedOptions,
    ) -> Result<Arc<dyn AccountFeed>, AssemblyError> {
        self.open_feed(FeedKind::Trades, options).await
    }

    async fn open_feed(
        &self,
        kind: FeedKind,
        options: &FeedOptions,
    ) -> Result<Arc<dyn AccountFeed>, AssemblyError> {
        let feed = match kind {
            FeedKind::Account => self.session.account(options),
            FeedKind::AccountSummary => self.session.account_summary(options),
            FeedKind::Positions => self.session.positions(options),
            FeedKind::Trades => self.session.trades(options),
        };

        // Bound before the load resolves so the shell can see it loading.
        let name = options.name_for(kind);
        self.assign(name, Handle::Feed(Arc::clone(&feed)));

        feed.loaded()
            .await
            .map_err(|source| lookup_failed(Stage::Feeds, name, source))?;
        metrics::record_lookup(Stage::Feeds, true);

        tracing::info!(feed = name, "Feed loaded");
        Ok(feed)
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Close the session and discard the workspace.
    ///
    /// Bindings are dropped without cancelling them; the session tears down
    /// its own feeds. Background market-open listeners are abandoned.
    ///
    /// # Errors
    ///
    /// Returns the session's error if closing the connection fails.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.shutdown.cancel();
        self.workspace.write().clear();
        metrics::set_workspace_bindings(0);

        tracing::info!("Closing session");
        self.session.close().await
    }
}

fn lookup_failed(stage: Stage, symbol: &str, source: BrokerError) -> AssemblyError {
    metrics::record_lookup(stage, false);
    tracing::warn!(stage = stage.as_str(), symbol, error = %source, "Lookup failed");
    AssemblyError::Lookup {
        stage,
        symbol: symbol.to_string(),
        source,
    }
}

// =============================================================================
// Tests
// =============================================================================
